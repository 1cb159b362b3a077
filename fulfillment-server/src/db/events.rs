use shared::event::{ClaimOutcome, EventStatus, ProcessedEvent};
use sqlx::PgPool;

use crate::store::StoreError;

/// Insert-if-absent claim; also reclaims `failed` rows and expired
/// `processing` leases. Exactly one concurrent caller sees one affected row.
pub async fn claim(
    pool: &PgPool,
    event_key: &str,
    event_type: &str,
    now: i64,
    lease_cutoff: i64,
) -> Result<ClaimOutcome, StoreError> {
    let result = sqlx::query(
        "INSERT INTO processed_events (event_key, event_type, status, claimed_at)
         VALUES ($1, $2, 'processing', $3)
         ON CONFLICT (event_key) DO UPDATE
            SET status = 'processing', claimed_at = EXCLUDED.claimed_at, last_error = NULL
            WHERE processed_events.status = 'failed'
               OR (processed_events.status = 'processing' AND processed_events.claimed_at < $4)",
    )
    .bind(event_key)
    .bind(event_type)
    .bind(now)
    .bind(lease_cutoff)
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(ClaimOutcome::Claimed);
    }

    let status: Option<(String,)> =
        sqlx::query_as("SELECT status FROM processed_events WHERE event_key = $1")
            .bind(event_key)
            .fetch_optional(pool)
            .await?;

    Ok(match status.as_ref().and_then(|(s,)| EventStatus::from_db(s)) {
        Some(EventStatus::Processed) => ClaimOutcome::AlreadyProcessed,
        // processing, or failed again by someone who reclaimed it in between
        _ => ClaimOutcome::InFlight,
    })
}

pub async fn finish(
    pool: &PgPool,
    event_key: &str,
    status: EventStatus,
    error: Option<&str>,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE processed_events SET status = $2, last_error = $3, processed_at = $4
         WHERE event_key = $1",
    )
    .bind(event_key)
    .bind(status.as_db())
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_key: String,
    event_type: String,
    status: String,
    claimed_at: i64,
    processed_at: Option<i64>,
    last_error: Option<String>,
}

pub async fn find(pool: &PgPool, event_key: &str) -> Result<Option<ProcessedEvent>, StoreError> {
    let row: Option<EventRow> = sqlx::query_as(
        "SELECT event_key, event_type, status, claimed_at, processed_at, last_error
         FROM processed_events WHERE event_key = $1",
    )
    .bind(event_key)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        let status = EventStatus::from_db(&r.status)
            .ok_or_else(|| StoreError::Corrupt(format!("event status {}", r.status)))?;
        Ok(ProcessedEvent {
            event_key: r.event_key,
            event_type: r.event_type,
            status,
            claimed_at: r.claimed_at,
            processed_at: r.processed_at,
            last_error: r.last_error,
        })
    })
    .transpose()
}
