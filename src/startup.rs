use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub identity: bool,
    pub notification: bool,
    pub credential: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.identity && self.notification && self.credential
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables:    {}", status(self.environment));
        println!("Database Connectivity:    {}", status(self.database));
        println!("Identity Service:         {}", status(self.identity));
        println!("Notification Gateway:     {}", status(self.notification));
        println!("Credential Service:       {}", status(self.credential));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        identity: true,
        notification: true,
        credential: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_http(&config.identity_base_url, "identity service").await {
        report.identity = false;
        report.errors.push(format!("Identity: {}", e));
    }

    if let Err(e) = validate_http(&config.notification_base_url, "notification gateway").await {
        report.notification = false;
        report.errors.push(format!("Notification: {}", e));
    }

    if let Err(e) = validate_http(&config.credential_base_url, "credential service").await {
        report.credential = false;
        report.errors.push(format!("Credential: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.otp_secret.is_empty() {
        anyhow::bail!("OTP_SECRET is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.otp_expiry_secs <= 0 {
        anyhow::bail!("OTP_EXPIRY_SECS must be greater than 0");
    }
    if config.otp_max_attempts <= 0 {
        anyhow::bail!("OTP_MAX_ATTEMPTS must be greater than 0");
    }

    url::Url::parse(&config.identity_base_url).context("IDENTITY_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.notification_base_url)
        .context("NOTIFICATION_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.credential_base_url)
        .context("CREDENTIAL_BASE_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_http(base_url: &str, name: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    client
        .get(base_url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to {}", name))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn test_config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/resident".to_string(),
            identity_base_url: "https://identity.example.test".to_string(),
            notification_base_url: "https://notify.example.test".to_string(),
            credential_base_url: "https://credential.example.test".to_string(),
            otp_secret: "secret".to_string(),
            otp_expiry_secs: 180,
            otp_max_attempts: 3,
            otp_rate_limit_per_hour: NonZeroU32::new(10).unwrap(),
            mandatory_language: "eng".to_string(),
            card_poll_interval_secs: 30,
        }
    }

    #[test]
    fn test_validate_env_vars_ok() {
        assert!(validate_env_vars(&test_config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_empty_database_url() {
        let mut config = test_config();
        config.database_url = String::new();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_url() {
        let mut config = test_config();
        config.identity_base_url = "not-a-url".to_string();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_empty_otp_secret() {
        let mut config = test_config();
        config.otp_secret = String::new();
        assert!(validate_env_vars(&config).is_err());
    }
}
