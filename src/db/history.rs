//! History Query Engine: one typed filter, one predicate builder, and a
//! fetch/count pair generated from the same predicates so the page and its
//! total can never disagree.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Result};

use crate::db::models::ResidentEvent;

/// Filter for a resident's service-history view. `token_id` and the allowed
/// request types are always present; everything else narrows the view when
/// set. Any subset of the optional fields may be combined.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub token_id: String,
    pub request_type_codes: Vec<String>,
    pub olv_partner_id: Option<String>,
    pub status_codes: Option<Vec<String>>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub event_id_search: Option<String>,
}

impl HistoryFilter {
    pub fn new(token_id: impl Into<String>, request_type_codes: Vec<String>) -> Self {
        Self {
            token_id: token_id.into(),
            request_type_codes,
            olv_partner_id: None,
            status_codes: None,
            date_range: None,
            event_id_search: None,
        }
    }
}

/// Rows with a NULL partner are globally visible; a named partner additionally
/// sees its own rows. Omitting the scope entirely matches every row.
pub(crate) fn push_partner_rule(
    qb: &mut QueryBuilder<'static, Postgres>,
    olv_partner_id: &Option<String>,
) {
    if let Some(partner) = olv_partner_id {
        qb.push(" AND (olv_partner_id IS NULL OR olv_partner_id = ")
            .push_bind(partner.clone())
            .push(")");
    }
}

fn push_predicates(qb: &mut QueryBuilder<'static, Postgres>, filter: &HistoryFilter) {
    qb.push(" WHERE token_id = ").push_bind(filter.token_id.clone());
    qb.push(" AND request_type_code = ANY(")
        .push_bind(filter.request_type_codes.clone())
        .push(")");
    push_partner_rule(qb, &filter.olv_partner_id);
    if let Some(statuses) = &filter.status_codes {
        qb.push(" AND status_code = ANY(")
            .push_bind(statuses.clone())
            .push(")");
    }
    if let Some((start, end)) = &filter.date_range {
        qb.push(" AND cr_dtimes BETWEEN ")
            .push_bind(*start)
            .push(" AND ")
            .push_bind(*end);
    }
    if let Some(needle) = &filter.event_id_search {
        qb.push(" AND event_id LIKE '%' || ")
            .push_bind(needle.clone())
            .push(" || '%'");
    }
}

fn fetch_query(filter: &HistoryFilter, limit: i64, offset: i64) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT * FROM resident_transaction");
    push_predicates(&mut qb, filter);
    // Fixed sort: pinned entries float to the top, then newest first.
    qb.push(" ORDER BY pinned_status DESC, cr_dtimes DESC");
    qb.push(" LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(offset);
    qb
}

fn count_query(filter: &HistoryFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM resident_transaction");
    push_predicates(&mut qb, filter);
    qb
}

pub async fn fetch_page(
    pool: &PgPool,
    filter: &HistoryFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ResidentEvent>> {
    let mut qb = fetch_query(filter, limit, offset);
    qb.build_query_as::<ResidentEvent>().fetch_all(pool).await
}

pub async fn count(pool: &PgPool, filter: &HistoryFilter) -> Result<i64> {
    let mut qb = count_query(filter);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_filter() -> HistoryFilter {
        HistoryFilter::new("T1", vec!["UPDATE_MY_UIN".to_string(), "GET_MY_ID".to_string()])
    }

    fn with_status(mut f: HistoryFilter) -> HistoryFilter {
        f.status_codes = Some(vec!["SUCCESS".to_string(), "FAILED".to_string()]);
        f
    }

    fn with_dates(mut f: HistoryFilter) -> HistoryFilter {
        f.date_range = Some((
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
        ));
        f
    }

    fn with_search(mut f: HistoryFilter) -> HistoryFilter {
        f.event_id_search = Some("1234".to_string());
        f
    }

    /// The WHERE clause of the fetch query, i.e. everything between WHERE and
    /// ORDER BY.
    fn fetch_where(filter: &HistoryFilter) -> String {
        let sql = fetch_query(filter, 10, 0).into_sql();
        let start = sql.find(" WHERE ").unwrap();
        let end = sql.find(" ORDER BY ").unwrap();
        sql[start..end].to_string()
    }

    fn count_where(filter: &HistoryFilter) -> String {
        let sql = count_query(filter).into_sql();
        let start = sql.find(" WHERE ").unwrap();
        sql[start..].to_string()
    }

    #[test]
    fn fetch_and_count_predicates_never_diverge() {
        // All 8 combinations of {status} x {date range} x {event-id search}.
        let shapes: Vec<HistoryFilter> = vec![
            base_filter(),
            with_status(base_filter()),
            with_dates(base_filter()),
            with_search(base_filter()),
            with_status(with_dates(base_filter())),
            with_status(with_search(base_filter())),
            with_dates(with_search(base_filter())),
            with_status(with_dates(with_search(base_filter()))),
        ];

        for filter in &shapes {
            assert_eq!(fetch_where(filter), count_where(filter));
        }
    }

    #[test]
    fn optional_predicates_appear_only_when_set() {
        let plain = fetch_where(&base_filter());
        assert!(!plain.contains("status_code"));
        assert!(!plain.contains("cr_dtimes BETWEEN"));
        assert!(!plain.contains("LIKE"));
        assert!(!plain.contains("olv_partner_id"));

        let full = fetch_where(&with_status(with_dates(with_search(base_filter()))));
        assert!(full.contains("status_code = ANY"));
        assert!(full.contains("cr_dtimes BETWEEN"));
        assert!(full.contains("event_id LIKE '%' || "));
    }

    #[test]
    fn partner_scope_is_an_or_of_global_and_owned_rows() {
        let mut filter = base_filter();
        filter.olv_partner_id = Some("P1".to_string());
        let clause = fetch_where(&filter);
        assert!(clause.contains("(olv_partner_id IS NULL OR olv_partner_id = "));
    }

    #[test]
    fn sort_order_is_pinned_then_newest() {
        let sql = fetch_query(&base_filter(), 10, 0).into_sql();
        assert!(sql.contains("ORDER BY pinned_status DESC, cr_dtimes DESC"));
    }
}
