use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{conflict_on_unique, CoreResult};

/// Whether this webhook event id has already been fully processed.
pub async fn is_processed(db: &PgPool, event_id: &str) -> CoreResult<bool> {
    let row = sqlx::query_scalar::<_, i32>("SELECT 1 FROM idempotency WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}

/// Record an event id as processed. Storage-level uniqueness is the arbiter:
/// a duplicate insert surfaces as a conflict rather than silently succeeding,
/// so two concurrent deliveries cannot both believe they were first.
pub async fn mark_processed(db: &PgPool, event_id: &str) -> CoreResult<()> {
    sqlx::query("INSERT INTO idempotency (id, event_id) VALUES ($1, $2)")
        .bind(Uuid::new_v4())
        .bind(event_id)
        .execute(db)
        .await
        .map_err(|e| conflict_on_unique(e, "webhook_event_replayed"))?;
    Ok(())
}
