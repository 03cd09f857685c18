use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::AppError;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Identity not found: {0}")]
    NotFound(String),
    #[error("Invalid response from identity service: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotFound(id) => AppError::NotFound(format!("identity {}", id)),
            other => AppError::DownstreamAccess(other.to_string()),
        }
    }
}

/// Response from the identity resolver. `token_id` is the pseudonymous
/// subject key every ledger row is partitioned by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub individual_id: String,
    pub id_type: String,
    pub token_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Masked rendition of an individual id for ledger storage: everything but
/// the last four characters is replaced.
pub fn mask_id(individual_id: &str) -> String {
    let len = individual_id.chars().count();
    if len <= 4 {
        return individual_id.to_string();
    }
    let visible: String = individual_id.chars().skip(len - 4).collect();
    format!("{}{}", "X".repeat(len - 4), visible)
}

/// HTTP client for the identity resolver service
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl IdentityClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        IdentityClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Resolves an individual id to its token id, id type and contact channels.
    pub async fn resolve(&self, individual_id: &str) -> Result<ResolvedIdentity, IdentityError> {
        let url = format!(
            "{}/identity/{}",
            self.base_url.trim_end_matches('/'),
            individual_id
        );
        let client = self.client.clone();
        let id = individual_id.to_string();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?;

                if response.status() == 404 {
                    return Err(IdentityError::NotFound(id));
                }
                if !response.status().is_success() {
                    return Err(IdentityError::InvalidResponse(format!(
                        "identity service returned status {}",
                        response.status()
                    )));
                }

                let identity = response.json::<ResolvedIdentity>().await?;
                Ok(identity)
            })
            .await;

        match result {
            Ok(identity) => Ok(identity),
            Err(FailsafeError::Rejected) => Err(IdentityError::CircuitBreakerOpen(
                "identity service circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_client_creation() {
        let client = IdentityClient::new("https://identity.example.test".to_string());
        assert_eq!(client.base_url, "https://identity.example.test");
    }

    #[test]
    fn test_circuit_breaker_state() {
        let client = IdentityClient::new("https://identity.example.test".to_string());
        assert_eq!(client.circuit_state(), "closed");
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_id("7841261580"), "XXXXXX1580");
        assert_eq!(mask_id("1580"), "1580");
        assert_eq!(mask_id(""), "");
    }

    #[tokio::test]
    #[ignore]
    async fn test_resolve_with_mock() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r".*/identity/.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "individual_id": "7841261580",
                    "id_type": "UIN",
                    "token_id": "T-8251649601",
                    "email": "resident@example.com",
                    "phone": "9395910872"
                }"#,
            )
            .create_async().await;

        let client = IdentityClient::new(server.url());
        let identity = client.resolve("7841261580").await.unwrap();
        assert_eq!(identity.token_id, "T-8251649601");
        assert_eq!(identity.id_type, "UIN");
    }

    #[tokio::test]
    #[ignore]
    async fn test_resolve_not_found() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r".*/identity/.*".into()))
            .with_status(404)
            .create_async().await;

        let client = IdentityClient::new(server.url());
        let result = client.resolve("0000000000").await;
        assert!(matches!(result, Err(IdentityError::NotFound(_))));
    }
}
