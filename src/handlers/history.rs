use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::db::history::HistoryFilter;
use crate::db::models::{EventStatus, RequestType};
use crate::error::AppError;
use crate::handlers::require_header;
use crate::services::history::DEFAULT_PAGE_SIZE;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page_start: Option<i64>,
    pub page_size: Option<i64>,
    /// Comma-separated request type codes; defaults to every known type.
    pub request_types: Option<String>,
    /// Comma-separated status codes.
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Substring match against the event id.
    pub search: Option<String>,
    pub partner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnreadParams {
    pub request_types: Option<String>,
    pub partner_id: Option<String>,
    /// RFC 3339 timestamp of the resident's last notification click.
    pub since: Option<String>,
}

fn parse_date(field: &'static str, value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Validation(format!("invalid '{}' date: {}", field, e)))
}

fn parse_request_types(raw: &Option<String>) -> Result<Vec<String>, AppError> {
    match raw {
        None => Ok(RequestType::all_codes()),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| {
                RequestType::from_code(code)
                    .map(|t| t.as_str().to_string())
                    .ok_or_else(|| {
                        AppError::Validation(format!("unknown request type '{}'", code))
                    })
            })
            .collect(),
    }
}

fn parse_status_codes(raw: &Option<String>) -> Result<Option<Vec<String>>, AppError> {
    let Some(list) = raw else {
        return Ok(None);
    };

    let codes = list
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            EventStatus::from_code(code)
                .map(|s| s.as_str().to_string())
                .ok_or_else(|| AppError::Validation(format!("unknown status '{}'", code)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(if codes.is_empty() { None } else { Some(codes) })
}

fn build_filter(token_id: String, params: &HistoryParams) -> Result<HistoryFilter, AppError> {
    let mut filter = HistoryFilter::new(token_id, parse_request_types(&params.request_types)?);
    filter.olv_partner_id = params.partner_id.clone();
    filter.status_codes = parse_status_codes(&params.status)?;

    filter.date_range = match (&params.from, &params.to) {
        (Some(from), Some(to)) => {
            let start = parse_date("from", from)?;
            let end = parse_date("to", to)?;
            if start > end {
                return Err(AppError::Validation(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
            Some((start, end))
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "'from' and 'to' must be provided together".to_string(),
            ));
        }
    };

    filter.event_id_search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(filter)
}

pub async fn get_service_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let token_id = require_header(&headers, "X-Token-Id")?;
    let filter = build_filter(token_id, &params)?;

    let page = state
        .history
        .get_service_history(
            &filter,
            params.page_start.unwrap_or(0),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(page))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.history.get_event(&event_id).await?;
    Ok(Json(event))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.history.mark_read(&event_id).await?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("event {}", event_id)));
    }
    Ok(Json(json!({ "updated": updated })))
}

pub async fn pin_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    set_pinned(state, event_id, true).await
}

pub async fn unpin_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    set_pinned(state, event_id, false).await
}

async fn set_pinned(
    state: AppState,
    event_id: String,
    pinned: bool,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state.history.set_pinned(&event_id, pinned).await?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("event {}", event_id)));
    }
    Ok(Json(json!({ "updated": updated, "pinned": pinned })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UnreadParams>,
) -> Result<impl IntoResponse, AppError> {
    let token_id = require_header(&headers, "X-Token-Id")?;
    let request_types = parse_request_types(&params.request_types)?;

    let count = match &params.since {
        Some(since) => {
            let clicked_at = parse_date("since", since)?;
            state
                .history
                .unread_count_since(&token_id, &request_types, &params.partner_id, clicked_at)
                .await?
        }
        None => {
            state
                .history
                .unread_count(&token_id, &request_types, &params.partner_id)
                .await?
        }
    };

    Ok(Json(json!({ "unread": count })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HistoryParams {
        HistoryParams {
            page_start: None,
            page_size: None,
            request_types: None,
            status: None,
            from: None,
            to: None,
            search: None,
            partner_id: None,
        }
    }

    #[test]
    fn defaults_to_all_request_types() {
        let filter = build_filter("T1".to_string(), &params()).unwrap();
        assert_eq!(filter.request_type_codes, RequestType::all_codes());
        assert!(filter.status_codes.is_none());
        assert!(filter.date_range.is_none());
        assert!(filter.event_id_search.is_none());
    }

    #[test]
    fn rejects_unknown_request_type() {
        let mut p = params();
        p.request_types = Some("GET_MY_ID,BOGUS".to_string());
        assert!(build_filter("T1".to_string(), &p).is_err());
    }

    #[test]
    fn rejects_unknown_status() {
        let mut p = params();
        p.status = Some("DONE".to_string());
        assert!(build_filter("T1".to_string(), &p).is_err());
    }

    #[test]
    fn parses_status_list() {
        let mut p = params();
        p.status = Some("SUCCESS, FAILED".to_string());
        let filter = build_filter("T1".to_string(), &p).unwrap();
        assert_eq!(
            filter.status_codes,
            Some(vec!["SUCCESS".to_string(), "FAILED".to_string()])
        );
    }

    #[test]
    fn requires_both_date_bounds() {
        let mut p = params();
        p.from = Some("2024-01-01T00:00:00Z".to_string());
        assert!(build_filter("T1".to_string(), &p).is_err());

        p.to = Some("2024-12-31T00:00:00Z".to_string());
        let filter = build_filter("T1".to_string(), &p).unwrap();
        assert!(filter.date_range.is_some());
    }

    #[test]
    fn rejects_inverted_date_range() {
        let mut p = params();
        p.from = Some("2024-12-31T00:00:00Z".to_string());
        p.to = Some("2024-01-01T00:00:00Z".to_string());
        assert!(build_filter("T1".to_string(), &p).is_err());
    }

    #[test]
    fn blank_search_is_dropped() {
        let mut p = params();
        p.search = Some("   ".to_string());
        let filter = build_filter("T1".to_string(), &p).unwrap();
        assert!(filter.event_id_search.is_none());
    }
}
