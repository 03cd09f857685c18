//! OTP issuance and validation. Only an HMAC digest of the OTP is stored;
//! the raw value goes to the notification gateway and nowhere else.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clients::notification::NotificationClient;
use crate::config::Config;
use crate::error::AppError;
use crate::validation::OtpChannel;

type HmacSha256 = Hmac<Sha256>;
type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

fn otp_digest(
    secret: &str,
    user_id: &str,
    transaction_id: &str,
    otp: &str,
) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("invalid OTP secret".to_string()))?;
    mac.update(format!("{}|{}|{}", user_id, transaction_id, otp).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Clone)]
pub struct OtpManager {
    pool: PgPool,
    notifier: NotificationClient,
    secret: String,
    expiry_secs: i64,
    max_attempts: i32,
    limiter: Arc<KeyedLimiter>,
}

#[derive(Debug, sqlx::FromRow)]
struct ChallengeRow {
    id: Uuid,
    otp_digest: String,
    validation_attempts: i32,
    verified: bool,
    expires_at: DateTime<Utc>,
}

impl OtpManager {
    pub fn new(pool: PgPool, notifier: NotificationClient, config: &Config) -> Self {
        Self {
            pool,
            notifier,
            secret: config.otp_secret.clone(),
            expiry_secs: config.otp_expiry_secs,
            max_attempts: config.otp_max_attempts,
            limiter: Arc::new(RateLimiter::keyed(Quota::per_hour(
                config.otp_rate_limit_per_hour,
            ))),
        }
    }

    /// Issues a fresh OTP for the (user, transaction) pair, replacing any
    /// previous challenge, and hands it to the notification gateway.
    pub async fn send_otp(
        &self,
        user_id: &str,
        transaction_id: &str,
        channel: OtpChannel,
        language: &str,
    ) -> Result<bool, AppError> {
        self.limiter.check_key(&user_id.to_string()).map_err(|_| {
            AppError::Validation("OTP request limit reached, retry later".to_string())
        })?;

        let otp = generate_otp();
        let digest = otp_digest(&self.secret, user_id, transaction_id, &otp)?;
        let expires_at = Utc::now() + Duration::seconds(self.expiry_secs);

        sqlx::query(
            r#"
            INSERT INTO otp_challenge (
                id, user_id, transaction_id, otp_digest,
                validation_attempts, verified, generated_at, expires_at
            ) VALUES ($1, $2, $3, $4, 0, FALSE, NOW(), $5)
            ON CONFLICT (user_id, transaction_id) DO UPDATE
            SET otp_digest = EXCLUDED.otp_digest, validation_attempts = 0,
                verified = FALSE, generated_at = NOW(), expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(transaction_id)
        .bind(&digest)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let delivered = self
            .notifier
            .deliver_otp(user_id, &otp, channel, language)
            .await
            .map_err(AppError::from)?;

        Ok(delivered)
    }

    /// Checks an OTP against the stored challenge. A digest mismatch bumps the
    /// attempt counter and returns false; expiry, re-use and the attempt cap
    /// are validation errors.
    pub async fn validate_otp(
        &self,
        otp: &str,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<bool, AppError> {
        let challenge = sqlx::query_as::<_, ChallengeRow>(
            r#"
            SELECT id, otp_digest, validation_attempts, verified, expires_at
            FROM otp_challenge
            WHERE user_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(user_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        let challenge = challenge.ok_or_else(|| {
            AppError::Validation("no active OTP challenge for this transaction".to_string())
        })?;

        if challenge.verified {
            return Err(AppError::Validation(
                "OTP has already been consumed".to_string(),
            ));
        }
        if challenge.expires_at < Utc::now() {
            return Err(AppError::Validation("OTP has expired".to_string()));
        }
        if challenge.validation_attempts >= self.max_attempts {
            return Err(AppError::Validation(
                "OTP validation attempt limit reached".to_string(),
            ));
        }

        let digest = otp_digest(&self.secret, user_id, transaction_id, otp)?;
        if digest != challenge.otp_digest {
            sqlx::query(
                "UPDATE otp_challenge SET validation_attempts = validation_attempts + 1 WHERE id = $1",
            )
            .bind(challenge.id)
            .execute(&self.pool)
            .await?;
            return Ok(false);
        }

        sqlx::query("UPDATE otp_challenge SET verified = TRUE WHERE id = $1")
            .bind(challenge.id)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }
}
