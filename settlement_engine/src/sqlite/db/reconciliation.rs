use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{NewReconciliationEntry, ReconciliationEntry};

/// Adds the event to the queue. An open entry for the same reference and event kind is updated in place.
pub async fn dead_letter(
    entry: &NewReconciliationEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReconciliationEntry, sqlx::Error> {
    sqlx::query_as(
        r#"INSERT INTO reconciliation_queue (gateway_reference, order_id, event_kind, payload, reason, attempts,
            created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 1, $6, $6)
        ON CONFLICT (gateway_reference, event_kind) WHERE resolved_at IS NULL DO UPDATE SET
            attempts = attempts + 1,
            reason = excluded.reason,
            payload = excluded.payload,
            updated_at = excluded.updated_at
        RETURNING *"#,
    )
    .bind(&entry.gateway_reference)
    .bind(entry.order_id.as_str())
    .bind(entry.event_kind)
    .bind(&entry.payload)
    .bind(&entry.reason)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_entries(
    include_resolved: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReconciliationEntry>, sqlx::Error> {
    let sql = if include_resolved {
        "SELECT * FROM reconciliation_queue ORDER BY created_at ASC, id ASC"
    } else {
        "SELECT * FROM reconciliation_queue WHERE resolved_at IS NULL ORDER BY created_at ASC, id ASC"
    };
    sqlx::query_as(sql).fetch_all(conn).await
}

pub async fn resolve_entry(
    id: i64,
    resolution: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReconciliationEntry>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE reconciliation_queue SET resolved_at = $2, resolution = $3, updated_at = $2 WHERE id = $1 AND \
         resolved_at IS NULL RETURNING *",
    )
    .bind(id)
    .bind(now)
    .bind(resolution)
    .fetch_optional(conn)
    .await
}
