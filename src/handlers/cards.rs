use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::ServiceError;
use crate::handlers::require_header;
use crate::services::card::CardDownload;

#[derive(Debug, Deserialize)]
pub struct DownloadCardRequest {
    pub individual_id: String,
    pub otp: String,
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PersonalizedCardRequest {
    /// Base64-encoded HTML the card is rendered from.
    pub html: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

fn pdf_response(bytes: Vec<u8>, event_id: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE.as_str(), "application/pdf"),
            ("x-event-id", event_id),
        ],
        bytes,
    )
        .into_response()
}

pub async fn download_card(
    State(state): State<AppState>,
    Json(payload): Json<DownloadCardRequest>,
) -> Result<Response, ServiceError> {
    let (outcome, event_id) = state
        .cards
        .download_card(&payload.individual_id, &payload.otp, &payload.transaction_id)
        .await?;

    Ok(match outcome {
        CardDownload::Ready(bytes) => pdf_response(bytes, &event_id),
        CardDownload::Accepted => (
            StatusCode::ACCEPTED,
            [("x-event-id", event_id.clone())],
            Json(json!({ "status": "in-progress", "event_id": event_id })),
        )
            .into_response(),
    })
}

pub async fn personalized_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PersonalizedCardRequest>,
) -> Result<Response, ServiceError> {
    let token_id = require_header(&headers, "X-Token-Id")?;

    let (bytes, event_id) = state
        .cards
        .download_personalized_card(&token_id, &payload.html, &payload.attributes)
        .await?;

    Ok(pdf_response(bytes, &event_id))
}
