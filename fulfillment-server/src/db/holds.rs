use shared::inventory::{CheckoutHold, HoldStatus, StockLine};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

#[derive(sqlx::FromRow)]
struct HoldRow {
    hold_id: String,
    session_id: Option<String>,
    lines: Json<Vec<StockLine>>,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl HoldRow {
    fn into_hold(self) -> Option<CheckoutHold> {
        Some(CheckoutHold {
            status: HoldStatus::from_db(&self.status)?,
            hold_id: self.hold_id,
            session_id: self.session_id,
            lines: self.lines.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const HOLD_COLUMNS: &str = "hold_id, session_id, lines, status, created_at, updated_at";

pub async fn insert(
    conn: &mut PgConnection,
    hold_id: &str,
    lines: &[StockLine],
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO checkout_holds (hold_id, session_id, lines, status, created_at, updated_at)
         VALUES ($1, NULL, $2, 'held', $3, $3)",
    )
    .bind(hold_id)
    .bind(Json(lines))
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn attach_session(
    pool: &PgPool,
    hold_id: &str,
    session_id: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE checkout_holds SET session_id = $2, updated_at = $3
         WHERE hold_id = $1 AND session_id IS NULL",
    )
    .bind(hold_id)
    .bind(session_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find(pool: &PgPool, hold_id: &str) -> Result<Option<CheckoutHold>, sqlx::Error> {
    let row: Option<HoldRow> = sqlx::query_as(&format!(
        "SELECT {HOLD_COLUMNS} FROM checkout_holds WHERE hold_id = $1"
    ))
    .bind(hold_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(HoldRow::into_hold))
}

pub async fn find_by_session(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<CheckoutHold>, sqlx::Error> {
    let row: Option<HoldRow> = sqlx::query_as(&format!(
        "SELECT {HOLD_COLUMNS} FROM checkout_holds WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(HoldRow::into_hold))
}

/// Guarded `held -> to` transition. Returns the hold's lines when this call
/// performed the transition.
pub async fn settle(
    conn: &mut PgConnection,
    hold_id: &str,
    to: HoldStatus,
    now: i64,
) -> Result<Option<Vec<StockLine>>, sqlx::Error> {
    let row: Option<(Json<Vec<StockLine>>,)> = sqlx::query_as(
        "UPDATE checkout_holds SET status = $2, updated_at = $3
         WHERE hold_id = $1 AND status = 'held'
         RETURNING lines",
    )
    .bind(hold_id)
    .bind(to.as_db())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|(lines,)| lines.0))
}

pub async fn list_stale(
    pool: &PgPool,
    created_before: i64,
    limit: usize,
) -> Result<Vec<CheckoutHold>, sqlx::Error> {
    let rows: Vec<HoldRow> = sqlx::query_as(&format!(
        "SELECT {HOLD_COLUMNS} FROM checkout_holds
         WHERE status = 'held' AND created_at < $1
         ORDER BY created_at
         LIMIT $2"
    ))
    .bind(created_before)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(HoldRow::into_hold).collect())
}
