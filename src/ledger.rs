//! Ledger lifecycle: every tracked operation builds one `TrackedEvent`,
//! mutates it along the way, and funnels through `close_event` on every exit
//! path. The record is persisted exactly once, at the end.

use rand::Rng;
use sqlx::PgPool;

use crate::db::models::{EventStatus, RequestType, ResidentEvent};
use crate::db::queries;
use crate::error::{AppError, ServiceError};

const EVENT_ID_DIGITS: usize = 16;

/// Generates the globally unique, immutable event identifier assigned at
/// record creation.
pub fn new_event_id() -> String {
    let mut rng = rand::thread_rng();
    (0..EVENT_ID_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// An in-flight ledger record. Starts in NEW with summary "in-progress"; the
/// owning operation marks the outcome before the record is sealed and written.
#[derive(Debug)]
pub struct TrackedEvent {
    record: ResidentEvent,
    status_was_set: bool,
}

impl TrackedEvent {
    pub fn begin(request_type: RequestType, token_id: impl Into<String>) -> Self {
        Self {
            record: ResidentEvent::new(new_event_id(), request_type, token_id.into()),
            status_was_set: false,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.record.event_id
    }

    pub fn record_mut(&mut self) -> &mut ResidentEvent {
        &mut self.record
    }

    /// Records the operation's outcome. Usually a terminal status; operations
    /// that hand off to an asynchronous job may deliberately leave the record
    /// IN_PROGRESS for the poller to finish.
    pub fn complete(&mut self, status: EventStatus, summary: &str) {
        self.record.status_code = status.as_str().to_string();
        self.record.request_summary = Some(summary.to_string());
        self.status_was_set = true;
    }

    pub fn fail(&mut self) {
        self.record.status_code = EventStatus::Failed.as_str().to_string();
        self.record.request_summary = Some("failed".to_string());
        self.status_was_set = true;
    }

    fn seal(&mut self, operation_failed: bool) {
        // A failure overrides whatever status was set earlier; an operation
        // that never recorded an outcome is treated as failed too.
        if operation_failed || !self.status_was_set {
            self.fail();
        }
    }
}

/// The single exit step of a tracked operation: seals the record, persists it
/// exactly once, and rethrows the operation's error tagged with the event id.
///
/// If both the operation and the ledger insert fail, the operation's own error
/// wins and the dropped write is logged; an insert failure after a successful
/// operation surfaces as a persistence error.
pub async fn close_event<T>(
    pool: &PgPool,
    mut tracked: TrackedEvent,
    outcome: Result<T, AppError>,
) -> Result<(T, String), ServiceError> {
    let event_id = tracked.record.event_id.clone();
    tracked.seal(outcome.is_err());
    tracked.record.upd_dtimes = Some(chrono::Utc::now());

    let persisted = queries::insert_event(pool, &tracked.record).await;

    match (outcome, persisted) {
        (Ok(value), Ok(_)) => Ok((value, event_id)),
        (Ok(_), Err(db)) => {
            Err(ServiceError::new(AppError::Database(db)).with_event_id(event_id))
        }
        (Err(op), Ok(_)) => Err(ServiceError::new(op).with_event_id(event_id)),
        (Err(op), Err(db)) => {
            tracing::error!(
                event_id = %event_id,
                error = %db,
                "dropping ledger write failure for an already-failed operation"
            );
            Err(ServiceError::new(op).with_event_id(event_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_sixteen_digits() {
        let id = new_event_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn consecutive_event_ids_differ() {
        assert_ne!(new_event_id(), new_event_id());
    }

    #[test]
    fn begin_starts_in_progress() {
        let tracked = TrackedEvent::begin(RequestType::UpdateMyUin, "T1");
        assert_eq!(tracked.record.status_code, "NEW");
        assert_eq!(tracked.record.request_summary.as_deref(), Some("in-progress"));
    }

    #[test]
    fn seal_keeps_explicit_success() {
        let mut tracked = TrackedEvent::begin(RequestType::UpdateMyUin, "T1");
        tracked.complete(EventStatus::Success, "OTP validated successfully");
        tracked.seal(false);
        assert_eq!(tracked.record.status_code, "SUCCESS");
        assert_eq!(
            tracked.record.request_summary.as_deref(),
            Some("OTP validated successfully")
        );
    }

    #[test]
    fn seal_overrides_earlier_status_on_failure() {
        let mut tracked = TrackedEvent::begin(RequestType::GetMyId, "T1");
        tracked.complete(EventStatus::Success, "Card downloaded");
        tracked.seal(true);
        assert_eq!(tracked.record.status_code, "FAILED");
        assert_eq!(tracked.record.request_summary.as_deref(), Some("failed"));
    }

    #[test]
    fn seal_defaults_unset_status_to_failed() {
        let mut tracked = TrackedEvent::begin(RequestType::GetMyId, "T1");
        tracked.seal(false);
        assert_eq!(tracked.record.status_code, "FAILED");
        assert_eq!(tracked.record.request_summary.as_deref(), Some("failed"));
    }

    #[test]
    fn seal_keeps_deliberate_in_progress_handoff() {
        let mut tracked = TrackedEvent::begin(RequestType::GetMyId, "T1");
        tracked.complete(EventStatus::InProgress, "card issuance requested");
        tracked.seal(false);
        assert_eq!(tracked.record.status_code, "IN_PROGRESS");
    }
}
