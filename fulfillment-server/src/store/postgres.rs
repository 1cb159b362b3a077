//! PostgreSQL backend

use async_trait::async_trait;
use shared::catalog::{Customer, Variant};
use shared::event::{ClaimOutcome, EventStatus, ProcessedEvent};
use shared::inventory::{CheckoutHold, HoldStatus, InventoryAdjustment, StockLine, VariantInventory};
use shared::order::Order;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{
    CatalogStore, EventLedgerStore, InventoryStore, OrderStateUpdate, OrderStore, StoreError,
    StoreResult,
};
use crate::db;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn inventory(&self, variant_id: &str) -> StoreResult<Option<VariantInventory>> {
        Ok(db::inventory::find(&self.pool, variant_id).await?)
    }

    async fn reserve(&self, lines: &[StockLine]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        if let Some(variant_id) =
            db::inventory::reserve_lines(&mut tx, lines, shared::util::now_millis()).await?
        {
            tx.rollback().await?;
            return Err(StoreError::InsufficientInventory { variant_id });
        }
        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, lines: &[StockLine]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let applied =
            db::inventory::release_lines(&mut tx, lines, shared::util::now_millis()).await?;
        tx.commit().await?;
        Ok(applied)
    }

    async fn reserve_hold(&self, hold_id: &str, lines: &[StockLine], now: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        if let Some(variant_id) = db::inventory::reserve_lines(&mut tx, lines, now).await? {
            tx.rollback().await?;
            return Err(StoreError::InsufficientInventory { variant_id });
        }
        db::holds::insert(&mut tx, hold_id, lines, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn attach_session(&self, hold_id: &str, session_id: &str, now: i64) -> StoreResult<bool> {
        Ok(db::holds::attach_session(&self.pool, hold_id, session_id, now).await?)
    }

    async fn find_hold(&self, hold_id: &str) -> StoreResult<Option<CheckoutHold>> {
        Ok(db::holds::find(&self.pool, hold_id).await?)
    }

    async fn find_hold_by_session(&self, session_id: &str) -> StoreResult<Option<CheckoutHold>> {
        Ok(db::holds::find_by_session(&self.pool, session_id).await?)
    }

    async fn release_hold(&self, hold_id: &str, now: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(lines) = db::holds::settle(&mut tx, hold_id, HoldStatus::Released, now).await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };
        db::inventory::drop_reserved(&mut tx, &lines, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn stale_holds(&self, created_before: i64, limit: usize) -> StoreResult<Vec<CheckoutHold>> {
        Ok(db::holds::list_stale(&self.pool, created_before, limit).await?)
    }

    async fn record_sale(
        &self,
        order_id: &str,
        hold_id: Option<&str>,
        lines: &[StockLine],
        now: i64,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        db::inventory::decrement_on_hand(&mut tx, order_id, lines, now).await?;
        if let Some(hold_id) = hold_id
            && let Some(held) = db::holds::settle(&mut tx, hold_id, HoldStatus::Consumed, now).await?
        {
            db::inventory::drop_reserved(&mut tx, &held, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn adjustments(&self, variant_id: &str) -> StoreResult<Vec<InventoryAdjustment>> {
        Ok(db::inventory::list_adjustments(&self.pool, variant_id).await?)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_order_by_session(&self, session_id: &str) -> StoreResult<Option<Order>> {
        db::orders::find_by_session(&self.pool, session_id).await
    }

    async fn find_order_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        db::orders::find_by_payment_intent(&self.pool, payment_intent_id).await
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        db::orders::insert(&self.pool, order).await
    }

    async fn update_order_state(
        &self,
        order_id: &str,
        update: &OrderStateUpdate,
        now: i64,
    ) -> StoreResult<bool> {
        Ok(db::orders::update_state(&self.pool, order_id, update, now).await?)
    }
}

#[async_trait]
impl EventLedgerStore for PgStore {
    async fn claim_event(
        &self,
        event_key: &str,
        event_type: &str,
        now: i64,
        lease_cutoff: i64,
    ) -> StoreResult<ClaimOutcome> {
        db::events::claim(&self.pool, event_key, event_type, now, lease_cutoff).await
    }

    async fn finish_event(
        &self,
        event_key: &str,
        status: EventStatus,
        error: Option<&str>,
        now: i64,
    ) -> StoreResult<()> {
        Ok(db::events::finish(&self.pool, event_key, status, error, now).await?)
    }

    async fn find_event(&self, event_key: &str) -> StoreResult<Option<ProcessedEvent>> {
        db::events::find(&self.pool, event_key).await
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_variants(&self, ids: &[String]) -> StoreResult<Vec<Variant>> {
        Ok(db::catalog::find_variants(&self.pool, ids).await?)
    }

    async fn find_customer(&self, customer_id: &str) -> StoreResult<Option<Customer>> {
        Ok(db::catalog::find_customer(&self.pool, customer_id).await?)
    }
}
