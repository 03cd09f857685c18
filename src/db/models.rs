use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per resident-initiated action. Status and request-type codes are
/// stored as text; `EventStatus`/`RequestType` give the typed view at the
/// service seam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResidentEvent {
    pub event_id: String,
    pub request_trn_id: Option<String>,
    pub token_id: String,
    pub ref_id: Option<String>,
    pub ref_id_type: Option<String>,
    pub request_type_code: String,
    pub status_code: String,
    pub status_comment: Option<String>,
    pub request_summary: Option<String>,
    pub purpose: Option<String>,
    pub attribute_list: Option<String>,
    pub read_status: bool,
    pub pinned_status: bool,
    pub olv_partner_id: Option<String>,
    pub credential_request_id: Option<String>,
    pub cr_dtimes: DateTime<Utc>,
    pub upd_dtimes: Option<DateTime<Utc>>,
    pub upd_by: Option<String>,
}

impl ResidentEvent {
    pub fn new(event_id: String, request_type: RequestType, token_id: String) -> Self {
        Self {
            event_id,
            request_trn_id: None,
            token_id,
            ref_id: None,
            ref_id_type: None,
            request_type_code: request_type.as_str().to_string(),
            status_code: EventStatus::New.as_str().to_string(),
            status_comment: None,
            request_summary: Some("in-progress".to_string()),
            purpose: None,
            attribute_list: None,
            read_status: false,
            pinned_status: false,
            olv_partner_id: None,
            credential_request_id: None,
            cr_dtimes: Utc::now(),
            upd_dtimes: None,
            upd_by: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    New,
    InProgress,
    Success,
    CardReadyToDownload,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "NEW",
            EventStatus::InProgress => "IN_PROGRESS",
            EventStatus::Success => "SUCCESS",
            EventStatus::CardReadyToDownload => "CARD_READY_TO_DOWNLOAD",
            EventStatus::Failed => "FAILED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NEW" => Some(EventStatus::New),
            "IN_PROGRESS" => Some(EventStatus::InProgress),
            "SUCCESS" => Some(EventStatus::Success),
            "CARD_READY_TO_DOWNLOAD" => Some(EventStatus::CardReadyToDownload),
            "FAILED" => Some(EventStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses are never reopened; a retry creates a new record.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Success | EventStatus::CardReadyToDownload | EventStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    SendOtp,
    ValidateOtp,
    UpdateMyUin,
    GetMyId,
    DownloadPersonalizedCard,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::SendOtp => "SEND_OTP",
            RequestType::ValidateOtp => "VALIDATE_OTP",
            RequestType::UpdateMyUin => "UPDATE_MY_UIN",
            RequestType::GetMyId => "GET_MY_ID",
            RequestType::DownloadPersonalizedCard => "DOWNLOAD_PERSONALIZED_CARD",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SEND_OTP" => Some(RequestType::SendOtp),
            "VALIDATE_OTP" => Some(RequestType::ValidateOtp),
            "UPDATE_MY_UIN" => Some(RequestType::UpdateMyUin),
            "GET_MY_ID" => Some(RequestType::GetMyId),
            "DOWNLOAD_PERSONALIZED_CARD" => Some(RequestType::DownloadPersonalizedCard),
            _ => None,
        }
    }

    pub fn all_codes() -> Vec<String> {
        [
            RequestType::SendOtp,
            RequestType::ValidateOtp,
            RequestType::UpdateMyUin,
            RequestType::GetMyId,
            RequestType::DownloadPersonalizedCard,
        ]
        .iter()
        .map(|t| t.as_str().to_string())
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefIdType {
    Uin,
    Vid,
    Aid,
}

impl RefIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefIdType::Uin => "UIN",
            RefIdType::Vid => "VID",
            RefIdType::Aid => "AID",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "UIN" => Some(RefIdType::Uin),
            "VID" => Some(RefIdType::Vid),
            "AID" => Some(RefIdType::Aid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_defaults() {
        let event = ResidentEvent::new(
            "1234567890123456".to_string(),
            RequestType::UpdateMyUin,
            "T1".to_string(),
        );
        assert_eq!(event.status_code, "NEW");
        assert_eq!(event.request_type_code, "UPDATE_MY_UIN");
        assert_eq!(event.request_summary.as_deref(), Some("in-progress"));
        assert!(!event.read_status);
        assert!(!event.pinned_status);
        assert!(event.olv_partner_id.is_none());
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            EventStatus::New,
            EventStatus::InProgress,
            EventStatus::Success,
            EventStatus::CardReadyToDownload,
            EventStatus::Failed,
        ] {
            assert_eq!(EventStatus::from_code(status.as_str()), Some(status));
        }
        assert_eq!(EventStatus::from_code("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!EventStatus::New.is_terminal());
        assert!(!EventStatus::InProgress.is_terminal());
        assert!(EventStatus::Success.is_terminal());
        assert!(EventStatus::CardReadyToDownload.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
    }
}
