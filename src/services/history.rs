//! Service-history reads and the resident-controlled read/pin flags.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::db::history::{self, HistoryFilter};
use crate::db::models::ResidentEvent;
use crate::db::queries;
use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize)]
pub struct ServiceHistoryPage {
    pub total: i64,
    pub page_start: i64,
    pub page_size: i64,
    pub data: Vec<ResidentEvent>,
}

#[derive(Clone)]
pub struct HistoryService {
    db: PgPool,
}

impl HistoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// One page of a resident's history plus the total for the same filter.
    /// The count and fetch run against identical predicates.
    pub async fn get_service_history(
        &self,
        filter: &HistoryFilter,
        page_start: i64,
        page_size: i64,
    ) -> Result<ServiceHistoryPage, AppError> {
        let page_start = page_start.max(0);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = page_start * page_size;

        let total = history::count(&self.db, filter).await?;
        let data = history::fetch_page(&self.db, filter, page_size, offset).await?;

        Ok(ServiceHistoryPage {
            total,
            page_start,
            page_size,
            data,
        })
    }

    pub async fn get_event(&self, event_id: &str) -> Result<ResidentEvent, AppError> {
        queries::get_by_event_id(&self.db, event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {}", event_id)))
    }

    /// Marks an entry as seen. Returns the affected-row count; 0 means the
    /// event id does not exist and is not an error at this layer.
    pub async fn mark_read(&self, event_id: &str) -> Result<u64, AppError> {
        Ok(queries::update_read_status(&self.db, event_id).await?)
    }

    pub async fn set_pinned(&self, event_id: &str, pinned: bool) -> Result<u64, AppError> {
        Ok(queries::update_pinned_status(&self.db, event_id, pinned).await?)
    }

    pub async fn unread_count(
        &self,
        token_id: &str,
        request_type_codes: &[String],
        olv_partner_id: &Option<String>,
    ) -> Result<i64, AppError> {
        Ok(queries::count_unread(&self.db, token_id, request_type_codes, olv_partner_id).await?)
    }

    /// Unread entries created or updated since the resident last clicked
    /// through their notifications.
    pub async fn unread_count_since(
        &self,
        token_id: &str,
        request_type_codes: &[String],
        olv_partner_id: &Option<String>,
        clicked_at: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        Ok(queries::count_unread_since(
            &self.db,
            token_id,
            request_type_codes,
            olv_partner_id,
            clicked_at,
        )
        .await?)
    }
}
