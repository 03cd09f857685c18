use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::num::NonZeroU32;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub identity_base_url: String,
    pub notification_base_url: String,
    pub credential_base_url: String,
    pub otp_secret: String,
    pub otp_expiry_secs: i64,
    pub otp_max_attempts: i32,
    pub otp_rate_limit_per_hour: NonZeroU32,
    pub mandatory_language: String,
    pub card_poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            identity_base_url: env::var("IDENTITY_BASE_URL")?,
            notification_base_url: env::var("NOTIFICATION_BASE_URL")?,
            credential_base_url: env::var("CREDENTIAL_BASE_URL")?,
            otp_secret: env::var("OTP_SECRET")?,
            otp_expiry_secs: env::var("OTP_EXPIRY_SECS")
                .unwrap_or_else(|_| "180".to_string())
                .parse()?,
            otp_max_attempts: env::var("OTP_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            otp_rate_limit_per_hour: env::var("OTP_RATE_LIMIT_PER_HOUR")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            mandatory_language: env::var("MANDATORY_LANGUAGE")
                .unwrap_or_else(|_| "eng".to_string()),
            card_poll_interval_secs: env::var("CARD_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }
}
