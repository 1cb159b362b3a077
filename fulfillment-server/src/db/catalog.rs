use shared::catalog::{Customer, Variant};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: String,
    product_id: String,
    name: String,
    unit_amount: i64,
    active: bool,
}

pub async fn find_variants(pool: &PgPool, ids: &[String]) -> Result<Vec<Variant>, sqlx::Error> {
    let rows: Vec<VariantRow> = sqlx::query_as(
        "SELECT id, product_id, name, unit_amount, active FROM variants WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Variant {
            id: r.id,
            product_id: r.product_id,
            name: r.name,
            unit_amount: r.unit_amount,
            active: r.active,
        })
        .collect())
}

pub async fn find_customer(pool: &PgPool, customer_id: &str) -> Result<Option<Customer>, sqlx::Error> {
    let row: Option<(String, String, bool)> =
        sqlx::query_as("SELECT id, email, reminder_opt_in FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(id, email, reminder_opt_in)| Customer {
        id,
        email,
        reminder_opt_in,
    }))
}
