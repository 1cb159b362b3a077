use shared::order::{
    Order, OrderAmounts, OrderItem, OrderStatus, PaymentStatus, ShippingAddress,
};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::store::{OrderStateUpdate, StoreError};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    session_id: String,
    customer_id: Option<String>,
    customer_email: Option<String>,
    payment_intent_id: Option<String>,
    currency: String,
    subtotal: i64,
    tax: i64,
    shipping: i64,
    discount: i64,
    total: i64,
    refunded: i64,
    status: String,
    payment_status: String,
    shipping_address: Option<Json<ShippingAddress>>,
    discount_code: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    name: String,
    quantity: i64,
    unit_amount: i64,
    total_amount: i64,
    product_id: Option<String>,
    variant_id: Option<String>,
    options: Json<BTreeMap<String, String>>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        Self {
            name: r.name,
            quantity: r.quantity,
            unit_amount: r.unit_amount,
            total_amount: r.total_amount,
            product_id: r.product_id,
            variant_id: r.variant_id,
            options: r.options.0,
        }
    }
}

const ORDER_COLUMNS: &str = "id, session_id, customer_id, customer_email, payment_intent_id, currency,
    subtotal, tax, shipping, discount, total, refunded, status, payment_status,
    shipping_address, discount_code, created_at, updated_at";

async fn hydrate(pool: &PgPool, row: OrderRow) -> Result<Order, StoreError> {
    let items: Vec<OrderItemRow> = sqlx::query_as(
        "SELECT name, quantity, unit_amount, total_amount, product_id, variant_id, options
         FROM order_items WHERE order_id = $1 ORDER BY position",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let status = OrderStatus::from_db(&row.status)
        .ok_or_else(|| StoreError::Corrupt(format!("order status {}", row.status)))?;
    let payment_status = PaymentStatus::from_db(&row.payment_status).ok_or_else(|| {
        StoreError::Corrupt(format!("order payment_status {}", row.payment_status))
    })?;

    Ok(Order {
        id: row.id,
        session_id: row.session_id,
        customer_id: row.customer_id,
        customer_email: row.customer_email,
        payment_intent_id: row.payment_intent_id,
        currency: row.currency,
        amounts: OrderAmounts {
            subtotal: row.subtotal,
            tax: row.tax,
            shipping: row.shipping,
            discount: row.discount,
            total: row.total,
            refunded: row.refunded,
        },
        status,
        payment_status,
        shipping_address: row.shipping_address.map(|a| a.0),
        discount_code: row.discount_code,
        items: items.into_iter().map(Into::into).collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub async fn find_by_session(pool: &PgPool, session_id: &str) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(Some(hydrate(pool, r).await?)),
        None => Ok(None),
    }
}

pub async fn find_by_payment_intent(
    pool: &PgPool,
    payment_intent_id: &str,
) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_id = $1"
    ))
    .bind(payment_intent_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(Some(hydrate(pool, r).await?)),
        None => Ok(None),
    }
}

/// Insert order + items in one transaction.
///
/// The unique index on `session_id` decides concurrent creates; the loser
/// gets [`StoreError::DuplicateOrder`].
pub async fn insert(pool: &PgPool, order: &Order) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO orders (id, session_id, customer_id, customer_email, payment_intent_id, currency,
            subtotal, tax, shipping, discount, total, refunded, status, payment_status,
            shipping_address, discount_code, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(&order.id)
    .bind(&order.session_id)
    .bind(&order.customer_id)
    .bind(&order.customer_email)
    .bind(&order.payment_intent_id)
    .bind(&order.currency)
    .bind(order.amounts.subtotal)
    .bind(order.amounts.tax)
    .bind(order.amounts.shipping)
    .bind(order.amounts.discount)
    .bind(order.amounts.total)
    .bind(order.amounts.refunded)
    .bind(order.status.as_db())
    .bind(order.payment_status.as_db())
    .bind(order.shipping_address.as_ref().map(Json))
    .bind(&order.discount_code)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await;

    if let Err(e) = inserted {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return Err(StoreError::DuplicateOrder {
                session_id: order.session_id.clone(),
            });
        }
        return Err(e.into());
    }

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_items (order_id, position, name, quantity, unit_amount, total_amount,
                product_id, variant_id, options)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&order.id)
        .bind(position as i32)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_amount)
        .bind(item.total_amount)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(Json(&item.options))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn update_state(
    pool: &PgPool,
    order_id: &str,
    update: &OrderStateUpdate,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET
            status = COALESCE($2, status),
            payment_status = COALESCE($3, payment_status),
            refunded = COALESCE($4, refunded),
            updated_at = $5
         WHERE id = $1",
    )
    .bind(order_id)
    .bind(update.status.map(|s| s.as_db()))
    .bind(update.payment_status.map(|s| s.as_db()))
    .bind(update.refunded)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
