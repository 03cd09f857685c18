use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Result};

use crate::db::history::push_partner_rule;
use crate::db::models::ResidentEvent;

// --- Event Ledger Store ---

pub async fn insert_event(pool: &PgPool, event: &ResidentEvent) -> Result<ResidentEvent> {
    sqlx::query_as::<_, ResidentEvent>(
        r#"
        INSERT INTO resident_transaction (
            event_id, request_trn_id, token_id, ref_id, ref_id_type,
            request_type_code, status_code, status_comment, request_summary,
            purpose, attribute_list, read_status, pinned_status,
            olv_partner_id, credential_request_id, cr_dtimes, upd_dtimes, upd_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        RETURNING *
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.request_trn_id)
    .bind(&event.token_id)
    .bind(&event.ref_id)
    .bind(&event.ref_id_type)
    .bind(&event.request_type_code)
    .bind(&event.status_code)
    .bind(&event.status_comment)
    .bind(&event.request_summary)
    .bind(&event.purpose)
    .bind(&event.attribute_list)
    .bind(event.read_status)
    .bind(event.pinned_status)
    .bind(&event.olv_partner_id)
    .bind(&event.credential_request_id)
    .bind(event.cr_dtimes)
    .bind(event.upd_dtimes)
    .bind(&event.upd_by)
    .fetch_one(pool)
    .await
}

pub async fn get_by_event_id(pool: &PgPool, event_id: &str) -> Result<Option<ResidentEvent>> {
    sqlx::query_as::<_, ResidentEvent>("SELECT * FROM resident_transaction WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_credential_request_id(
    pool: &PgPool,
    request_id: &str,
) -> Result<Option<ResidentEvent>> {
    sqlx::query_as::<_, ResidentEvent>(
        "SELECT * FROM resident_transaction WHERE credential_request_id = $1",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await
}

/// Partial in-place mutation of the lifecycle fields. Returns the affected-row
/// count; 0 means the event id does not exist.
pub async fn update_event_status(
    pool: &PgPool,
    event_id: &str,
    status_code: &str,
    request_summary: &str,
    status_comment: Option<&str>,
    upd_by: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE resident_transaction
        SET status_code = $2, request_summary = $3, status_comment = COALESCE($4, status_comment),
            upd_by = $5, upd_dtimes = NOW()
        WHERE event_id = $1
        "#,
    )
    .bind(event_id)
    .bind(status_code)
    .bind(request_summary)
    .bind(status_comment)
    .bind(upd_by)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_read_status(pool: &PgPool, event_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE resident_transaction SET read_status = TRUE, upd_dtimes = NOW() WHERE event_id = $1",
    )
    .bind(event_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_pinned_status(pool: &PgPool, event_id: &str, pinned: bool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE resident_transaction SET pinned_status = $2, upd_dtimes = NOW() WHERE event_id = $1",
    )
    .bind(event_id)
    .bind(pinned)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Rows correlated to an asynchronous credential-issuance job that have not
/// reached a terminal state, oldest first. Input to the status poller.
pub async fn list_pending_credential_events(
    pool: &PgPool,
    status_codes: &[String],
    request_type_codes: &[String],
) -> Result<Vec<ResidentEvent>> {
    sqlx::query_as::<_, ResidentEvent>(
        r#"
        SELECT * FROM resident_transaction
        WHERE status_code = ANY($1)
        AND request_type_code = ANY($2)
        AND credential_request_id IS NOT NULL
        ORDER BY cr_dtimes ASC
        "#,
    )
    .bind(status_codes)
    .bind(request_type_codes)
    .fetch_all(pool)
    .await
}

// --- Read-tracking counts ---

pub async fn count_unread(
    pool: &PgPool,
    token_id: &str,
    request_type_codes: &[String],
    olv_partner_id: &Option<String>,
) -> Result<i64> {
    let mut qb = unread_query(token_id, request_type_codes, olv_partner_id);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Unread rows created or updated after the resident last clicked through
/// their notifications.
pub async fn count_unread_since(
    pool: &PgPool,
    token_id: &str,
    request_type_codes: &[String],
    olv_partner_id: &Option<String>,
    clicked_at: DateTime<Utc>,
) -> Result<i64> {
    let mut qb = unread_query(token_id, request_type_codes, olv_partner_id);
    qb.push(" AND (cr_dtimes >= ")
        .push_bind(clicked_at)
        .push(" OR upd_dtimes >= ")
        .push_bind(clicked_at)
        .push(")");
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

fn unread_query(
    token_id: &str,
    request_type_codes: &[String],
    olv_partner_id: &Option<String>,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT COUNT(*) FROM resident_transaction WHERE read_status = FALSE AND token_id = ",
    );
    qb.push_bind(token_id.to_string());
    qb.push(" AND request_type_code = ANY(")
        .push_bind(request_type_codes.to_vec())
        .push(")");
    push_partner_rule(&mut qb, olv_partner_id);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unread_query_applies_partner_rule_only_when_scoped() {
        let types = vec!["SEND_OTP".to_string()];

        let unscoped = unread_query("T1", &types, &None).into_sql();
        assert!(!unscoped.contains("olv_partner_id"));

        let scoped = unread_query("T1", &types, &Some("P1".to_string())).into_sql();
        assert!(scoped.contains("(olv_partner_id IS NULL OR olv_partner_id = "));
    }
}
