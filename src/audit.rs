//! Fire-and-forget audit trail. The insert runs on a spawned task so a slow
//! or broken audit store can never block or fail a ledger write.

use sqlx::PgPool;
use uuid::Uuid;

pub const SEND_OTP_SUCCESS: &str = "SEND_OTP_SUCCESS";
pub const SEND_OTP_FAILURE: &str = "SEND_OTP_FAILURE";
pub const VALIDATE_OTP_SUCCESS: &str = "VALIDATE_OTP_SUCCESS";
pub const VALIDATE_OTP_FAILURE: &str = "VALIDATE_OTP_FAILURE";
pub const CARD_DOWNLOAD_SUCCESS: &str = "CARD_DOWNLOAD_SUCCESS";
pub const CARD_DOWNLOAD_FAILURE: &str = "CARD_DOWNLOAD_FAILURE";

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub event_name: &'static str,
    pub event_id: Option<String>,
    pub actor: String,
    pub description: String,
}

#[derive(Clone)]
pub struct AuditSink {
    pool: PgPool,
}

impl AuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn record(&self, record: AuditRecord) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO audit_log (id, event_name, event_id, actor, description, cr_dtimes)
                VALUES ($1, $2, $3, $4, $5, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(record.event_name)
            .bind(&record.event_id)
            .bind(&record.actor)
            .bind(&record.description)
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::warn!(
                    event_name = record.event_name,
                    error = %e,
                    "audit write dropped"
                );
            }
        });
    }
}
