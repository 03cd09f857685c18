pub mod audit;
pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod otp;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;

use crate::audit::AuditSink;
use crate::clients::{CredentialClient, IdentityClient, NotificationClient};
use crate::config::Config;
use crate::otp::OtpManager;
use crate::services::{CardService, HistoryService, OtpFlowService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub credential: CredentialClient,
    pub notifier: NotificationClient,
    pub otp_flow: OtpFlowService,
    pub history: HistoryService,
    pub cards: CardService,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: &Config) -> Self {
        let identity = IdentityClient::new(config.identity_base_url.clone());
        let notifier = NotificationClient::new(config.notification_base_url.clone());
        let credential = CredentialClient::new(config.credential_base_url.clone());
        let audit = AuditSink::new(db.clone());
        let otp = OtpManager::new(db.clone(), notifier.clone(), config);

        Self {
            otp_flow: OtpFlowService::new(
                db.clone(),
                otp.clone(),
                identity.clone(),
                audit.clone(),
                config.mandatory_language.clone(),
            ),
            history: HistoryService::new(db.clone()),
            cards: CardService::new(
                db.clone(),
                otp,
                identity,
                credential.clone(),
                notifier.clone(),
                audit,
            ),
            credential,
            notifier,
            db,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/otp/send", post(handlers::otp::send_otp))
        .route("/otp/validate", post(handlers::otp::validate_otp))
        .route("/history", get(handlers::history::get_service_history))
        .route("/events/unread/count", get(handlers::history::unread_count))
        .route("/events/:event_id", get(handlers::history::get_event))
        .route("/events/:event_id/read", put(handlers::history::mark_read))
        .route(
            "/events/:event_id/pin",
            put(handlers::history::pin_event).delete(handlers::history::unpin_event),
        )
        .route("/cards/download", post(handlers::cards::download_card))
        .route("/cards/personalized", post(handlers::cards::personalized_card))
        .layer(axum_middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
