use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Downstream access error: {0}")]
    DownstreamAccess(String),

    #[error("OTP validation failed")]
    OtpValidationFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DownstreamAccess(_) => StatusCode::BAD_GATEWAY,
            AppError::OtpValidationFailed => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Operation-level error carrying the ledger event id (when one was assigned)
/// so clients can correlate a failure with its history entry.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct ServiceError {
    #[source]
    pub source: AppError,
    pub event_id: Option<String>,
}

impl ServiceError {
    pub fn new(source: AppError) -> Self {
        Self {
            source,
            event_id: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

impl From<AppError> for ServiceError {
    fn from(source: AppError) -> Self {
        Self::new(source)
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(AppError::Database(err))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.source.status_code();
        let body = Json(json!({
            "error": self.source.to_string(),
            "status": status.as_u16(),
            "event_id": self.event_id,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_downstream_error_status_code() {
        let error = AppError::DownstreamAccess("partner unreachable".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_otp_validation_failed_status_code() {
        assert_eq!(
            AppError::OtpValidationFailed.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_service_error_carries_event_id() {
        let error = ServiceError::new(AppError::OtpValidationFailed).with_event_id("1234567890123456");
        assert_eq!(error.event_id.as_deref(), Some("1234567890123456"));
        assert_eq!(error.source.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error = AppError::Validation("Invalid email format".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_service_error_response() {
        let error = ServiceError::new(AppError::OtpValidationFailed).with_event_id("42");
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
