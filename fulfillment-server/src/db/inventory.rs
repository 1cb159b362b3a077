use shared::inventory::{AdjustmentReason, InventoryAdjustment, StockLine, VariantInventory};
use sqlx::{PgConnection, PgPool};

#[derive(sqlx::FromRow)]
struct InventoryRow {
    variant_id: String,
    quantity_on_hand: i64,
    reserved: i64,
    updated_at: i64,
}

impl From<InventoryRow> for VariantInventory {
    fn from(r: InventoryRow) -> Self {
        Self {
            variant_id: r.variant_id,
            quantity_on_hand: r.quantity_on_hand,
            reserved: r.reserved,
            updated_at: r.updated_at,
        }
    }
}

pub async fn find(pool: &PgPool, variant_id: &str) -> Result<Option<VariantInventory>, sqlx::Error> {
    let row: Option<InventoryRow> = sqlx::query_as(
        "SELECT variant_id, quantity_on_hand, reserved, updated_at
         FROM variant_inventory WHERE variant_id = $1",
    )
    .bind(variant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

/// Guarded increment of `reserved`, line by line.
///
/// Returns the first variant whose available stock could not cover its line;
/// the caller must roll back the transaction in that case.
pub async fn reserve_lines(
    conn: &mut PgConnection,
    lines: &[StockLine],
    now: i64,
) -> Result<Option<String>, sqlx::Error> {
    for line in lines {
        let result = sqlx::query(
            "UPDATE variant_inventory
             SET reserved = reserved + $2, updated_at = $3
             WHERE variant_id = $1 AND $2 > 0 AND quantity_on_hand - reserved >= $2",
        )
        .bind(&line.variant_id)
        .bind(line.quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(Some(line.variant_id.clone()));
        }
    }
    Ok(None)
}

/// Guarded decrement of `reserved`; lines that would go negative are skipped
pub async fn release_lines(
    conn: &mut PgConnection,
    lines: &[StockLine],
    now: i64,
) -> Result<u64, sqlx::Error> {
    let mut applied = 0;
    for line in lines {
        let result = sqlx::query(
            "UPDATE variant_inventory
             SET reserved = reserved - $2, updated_at = $3
             WHERE variant_id = $1 AND reserved >= $2",
        )
        .bind(&line.variant_id)
        .bind(line.quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        applied += result.rows_affected();
    }
    Ok(applied)
}

/// Decrement `reserved` floored at zero (hold settlement)
pub async fn drop_reserved(
    conn: &mut PgConnection,
    lines: &[StockLine],
    now: i64,
) -> Result<(), sqlx::Error> {
    for line in lines {
        sqlx::query(
            "UPDATE variant_inventory
             SET reserved = GREATEST(reserved - $2, 0), updated_at = $3
             WHERE variant_id = $1",
        )
        .bind(&line.variant_id)
        .bind(line.quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Decrement physical stock floored at zero and append one `sale` adjustment per line
pub async fn decrement_on_hand(
    conn: &mut PgConnection,
    order_id: &str,
    lines: &[StockLine],
    now: i64,
) -> Result<(), sqlx::Error> {
    for line in lines {
        sqlx::query(
            "UPDATE variant_inventory
             SET quantity_on_hand = GREATEST(quantity_on_hand - $2, 0), updated_at = $3
             WHERE variant_id = $1",
        )
        .bind(&line.variant_id)
        .bind(line.quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO inventory_adjustments (id, variant_id, order_id, delta, reason, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&line.variant_id)
        .bind(order_id)
        .bind(-line.quantity)
        .bind(AdjustmentReason::Sale.as_db())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AdjustmentRow {
    id: String,
    variant_id: String,
    order_id: Option<String>,
    delta: i64,
    reason: String,
    created_at: i64,
}

pub async fn list_adjustments(
    pool: &PgPool,
    variant_id: &str,
) -> Result<Vec<InventoryAdjustment>, sqlx::Error> {
    let rows: Vec<AdjustmentRow> = sqlx::query_as(
        "SELECT id, variant_id, order_id, delta, reason, created_at
         FROM inventory_adjustments WHERE variant_id = $1
         ORDER BY created_at, id",
    )
    .bind(variant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| {
            let reason = AdjustmentReason::from_db(&r.reason)?;
            Some(InventoryAdjustment {
                id: r.id,
                variant_id: r.variant_id,
                order_id: r.order_id,
                delta: r.delta,
                reason,
                created_at: r.created_at,
            })
        })
        .collect())
}
