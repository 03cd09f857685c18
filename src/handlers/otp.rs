use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{AppError, ServiceError};
use crate::handlers::require_header;
use crate::validation::OtpChannel;

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub user_id: String,
    pub transaction_id: String,
}

#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateOtpRequest {
    pub user_id: String,
    pub otp: String,
    pub transaction_id: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateOtpResponse {
    pub status: String,
    pub message: String,
    pub event_id: String,
}

pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .otp_flow
        .send_otp(&payload.user_id, &payload.transaction_id)
        .await?;

    if !outcome.delivered {
        return Err(ServiceError::new(AppError::DownstreamAccess(
            "OTP delivery was not confirmed".to_string(),
        )));
    }

    let message = match outcome.channel {
        OtpChannel::Phone => "OTP sent to phone",
        OtpChannel::Email => "OTP sent to email",
    };

    Ok(Json(SendOtpResponse {
        status: "success".to_string(),
        message: message.to_string(),
    }))
}

pub async fn validate_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ValidateOtpRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let individual_id = require_header(&headers, "X-Individual-Id")?;

    let event_id = state
        .otp_flow
        .validate_otp(
            &individual_id,
            &payload.user_id,
            &payload.otp,
            &payload.transaction_id,
        )
        .await?;

    Ok(Json(ValidateOtpResponse {
        status: "success".to_string(),
        message: "OTP validated successfully".to_string(),
        event_id,
    }))
}
