pub mod card;
pub mod history;
pub mod otp_flow;

pub use card::CardService;
pub use history::HistoryService;
pub use otp_flow::OtpFlowService;
