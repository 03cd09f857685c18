pub mod credential;
pub mod identity;
pub mod notification;

pub use credential::CredentialClient;
pub use identity::IdentityClient;
pub use notification::NotificationClient;
