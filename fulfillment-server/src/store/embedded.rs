//! redb-backed store for local development and tests
//!
//! # Tables
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `variants` | `variant_id` | `Variant` |
//! | `customers` | `customer_id` | `Customer` |
//! | `inventory` | `variant_id` | `VariantInventory` |
//! | `adjustments` | `(variant_id, sequence)` | `InventoryAdjustment` |
//! | `holds` | `hold_id` | `CheckoutHold` |
//! | `hold_sessions` | `session_id` | `hold_id` |
//! | `orders` | `order_id` | `Order` |
//! | `order_sessions` | `session_id` | `order_id` |
//! | `order_intents` | `payment_intent_id` | `order_id` |
//! | `processed_events` | `event_key` | `ProcessedEvent` |
//!
//! redb serializes write transactions, so every check-then-write below runs
//! inside a single write transaction and is atomic with respect to other
//! callers. Values are JSON.

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::catalog::{Customer, Variant};
use shared::event::{ClaimOutcome, EventStatus, ProcessedEvent};
use shared::inventory::{
    AdjustmentReason, CheckoutHold, HoldStatus, InventoryAdjustment, StockLine, VariantInventory,
};
use shared::order::Order;
use std::path::Path;
use std::sync::Arc;

use super::{
    CatalogStore, EventLedgerStore, InventoryStore, OrderStateUpdate, OrderStore, StoreError,
    StoreResult,
};

const VARIANTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("variants");
const CUSTOMERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("customers");
const INVENTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("inventory");
const ADJUSTMENTS_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("adjustments");
const HOLDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("holds");
const HOLD_SESSIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("hold_sessions");
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
const ORDER_SESSIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_sessions");
const ORDER_INTENTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_intents");
const EVENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("processed_events");
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const ADJUSTMENT_SEQ_KEY: &str = "adjustment_seq";

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<Database>,
}

impl EmbeddedStore {
    /// Open or create the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(VARIANTS_TABLE)?;
            let _ = write_txn.open_table(CUSTOMERS_TABLE)?;
            let _ = write_txn.open_table(INVENTORY_TABLE)?;
            let _ = write_txn.open_table(ADJUSTMENTS_TABLE)?;
            let _ = write_txn.open_table(HOLDS_TABLE)?;
            let _ = write_txn.open_table(HOLD_SESSIONS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_SESSIONS_TABLE)?;
            let _ = write_txn.open_table(ORDER_INTENTS_TABLE)?;
            let _ = write_txn.open_table(EVENTS_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(ADJUSTMENT_SEQ_KEY)?.is_none() {
                seq_table.insert(ADJUSTMENT_SEQ_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run `f` in one write transaction; an error aborts everything it wrote.
    fn write<R>(&self, f: impl FnOnce(&WriteTransaction) -> StoreResult<R>) -> StoreResult<R> {
        let txn = self.db.begin_write()?;
        let out = f(&txn)?;
        txn.commit()?;
        Ok(out)
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn lookup_index(
        &self,
        index: TableDefinition<'static, &'static str, &'static str>,
        key: &str,
    ) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(index)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_string()))
    }

    // ========== Seeding (catalog is owned by an external service) ==========

    /// Upsert a variant and set its physical stock, keeping any reservation
    pub fn put_variant(&self, variant: &Variant, quantity_on_hand: i64) -> StoreResult<()> {
        let now = shared::util::now_millis();
        self.write(|txn| {
            txn.open_table(VARIANTS_TABLE)?
                .insert(variant.id.as_str(), encode(variant)?.as_slice())?;

            let mut table = txn.open_table(INVENTORY_TABLE)?;
            let existing: Option<VariantInventory> = match table.get(variant.id.as_str())? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let mut inv =
                existing.unwrap_or_else(|| VariantInventory::new(&variant.id, quantity_on_hand, now));
            inv.quantity_on_hand = quantity_on_hand;
            inv.updated_at = now;
            table.insert(variant.id.as_str(), encode(&inv)?.as_slice())?;
            Ok(())
        })
    }

    pub fn put_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.write(|txn| {
            txn.open_table(CUSTOMERS_TABLE)?
                .insert(customer.id.as_str(), encode(customer)?.as_slice())?;
            Ok(())
        })
    }
}

// ========== Transaction-scoped helpers ==========

fn load_inventory(txn: &WriteTransaction, variant_id: &str) -> StoreResult<Option<VariantInventory>> {
    let table = txn.open_table(INVENTORY_TABLE)?;
    match table.get(variant_id)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn save_inventory(txn: &WriteTransaction, inv: &VariantInventory) -> StoreResult<()> {
    let mut table = txn.open_table(INVENTORY_TABLE)?;
    table.insert(inv.variant_id.as_str(), encode(inv)?.as_slice())?;
    Ok(())
}

fn reserve_in(txn: &WriteTransaction, lines: &[StockLine], now: i64) -> StoreResult<()> {
    for line in lines {
        match load_inventory(txn, &line.variant_id)? {
            Some(mut inv)
                if line.quantity > 0 && inv.quantity_on_hand - inv.reserved >= line.quantity =>
            {
                inv.reserved += line.quantity;
                inv.updated_at = now;
                save_inventory(txn, &inv)?;
            }
            _ => {
                return Err(StoreError::InsufficientInventory {
                    variant_id: line.variant_id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn drop_reserved_in(txn: &WriteTransaction, lines: &[StockLine], now: i64) -> StoreResult<()> {
    for line in lines {
        if let Some(mut inv) = load_inventory(txn, &line.variant_id)? {
            inv.reserved = (inv.reserved - line.quantity).max(0);
            inv.updated_at = now;
            save_inventory(txn, &inv)?;
        }
    }
    Ok(())
}

fn next_sequence(txn: &WriteTransaction, key: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCE_TABLE)?;
    let next = table.get(key)?.map(|guard| guard.value()).unwrap_or(0) + 1;
    table.insert(key, next)?;
    Ok(next)
}

fn decrement_on_hand_in(
    txn: &WriteTransaction,
    order_id: &str,
    lines: &[StockLine],
    now: i64,
) -> StoreResult<()> {
    for line in lines {
        if let Some(mut inv) = load_inventory(txn, &line.variant_id)? {
            inv.quantity_on_hand = (inv.quantity_on_hand - line.quantity).max(0);
            inv.updated_at = now;
            save_inventory(txn, &inv)?;
        }

        let seq = next_sequence(txn, ADJUSTMENT_SEQ_KEY)?;
        let adjustment = InventoryAdjustment {
            id: uuid::Uuid::new_v4().to_string(),
            variant_id: line.variant_id.clone(),
            order_id: Some(order_id.to_string()),
            delta: -line.quantity,
            reason: AdjustmentReason::Sale,
            created_at: now,
        };
        let mut table = txn.open_table(ADJUSTMENTS_TABLE)?;
        table.insert((line.variant_id.as_str(), seq), encode(&adjustment)?.as_slice())?;
    }
    Ok(())
}

/// Guarded `held -> to` transition; returns the lines when it happened
fn settle_in(
    txn: &WriteTransaction,
    hold_id: &str,
    to: HoldStatus,
    now: i64,
) -> StoreResult<Option<Vec<StockLine>>> {
    let mut table = txn.open_table(HOLDS_TABLE)?;
    let hold: Option<CheckoutHold> = match table.get(hold_id)? {
        Some(guard) => Some(decode(guard.value())?),
        None => None,
    };
    match hold {
        Some(mut hold) if hold.status == HoldStatus::Held => {
            hold.status = to;
            hold.updated_at = now;
            table.insert(hold_id, encode(&hold)?.as_slice())?;
            Ok(Some(hold.lines))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl InventoryStore for EmbeddedStore {
    async fn inventory(&self, variant_id: &str) -> StoreResult<Option<VariantInventory>> {
        self.read_json(INVENTORY_TABLE, variant_id)
    }

    async fn reserve(&self, lines: &[StockLine]) -> StoreResult<()> {
        let now = shared::util::now_millis();
        self.write(|txn| reserve_in(txn, lines, now))
    }

    async fn release(&self, lines: &[StockLine]) -> StoreResult<u64> {
        let now = shared::util::now_millis();
        self.write(|txn| {
            let mut applied = 0;
            for line in lines {
                if let Some(mut inv) = load_inventory(txn, &line.variant_id)?
                    && inv.reserved >= line.quantity
                {
                    inv.reserved -= line.quantity;
                    inv.updated_at = now;
                    save_inventory(txn, &inv)?;
                    applied += 1;
                }
            }
            Ok(applied)
        })
    }

    async fn reserve_hold(&self, hold_id: &str, lines: &[StockLine], now: i64) -> StoreResult<()> {
        self.write(|txn| {
            reserve_in(txn, lines, now)?;
            let hold = CheckoutHold {
                hold_id: hold_id.to_string(),
                session_id: None,
                lines: lines.to_vec(),
                status: HoldStatus::Held,
                created_at: now,
                updated_at: now,
            };
            txn.open_table(HOLDS_TABLE)?
                .insert(hold_id, encode(&hold)?.as_slice())?;
            Ok(())
        })
    }

    async fn attach_session(&self, hold_id: &str, session_id: &str, now: i64) -> StoreResult<bool> {
        self.write(|txn| {
            let mut holds = txn.open_table(HOLDS_TABLE)?;
            let hold: Option<CheckoutHold> = match holds.get(hold_id)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let Some(mut hold) = hold.filter(|h| h.session_id.is_none()) else {
                return Ok(false);
            };
            hold.session_id = Some(session_id.to_string());
            hold.updated_at = now;
            holds.insert(hold_id, encode(&hold)?.as_slice())?;
            txn.open_table(HOLD_SESSIONS_TABLE)?
                .insert(session_id, hold_id)?;
            Ok(true)
        })
    }

    async fn find_hold(&self, hold_id: &str) -> StoreResult<Option<CheckoutHold>> {
        self.read_json(HOLDS_TABLE, hold_id)
    }

    async fn find_hold_by_session(&self, session_id: &str) -> StoreResult<Option<CheckoutHold>> {
        match self.lookup_index(HOLD_SESSIONS_TABLE, session_id)? {
            Some(hold_id) => self.read_json(HOLDS_TABLE, &hold_id),
            None => Ok(None),
        }
    }

    async fn release_hold(&self, hold_id: &str, now: i64) -> StoreResult<bool> {
        self.write(|txn| match settle_in(txn, hold_id, HoldStatus::Released, now)? {
            Some(lines) => {
                drop_reserved_in(txn, &lines, now)?;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn stale_holds(&self, created_before: i64, limit: usize) -> StoreResult<Vec<CheckoutHold>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(HOLDS_TABLE)?;

        let mut holds = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let hold: CheckoutHold = decode(value.value())?;
            if hold.status == HoldStatus::Held && hold.created_at < created_before {
                holds.push(hold);
            }
        }
        holds.sort_by_key(|h| h.created_at);
        holds.truncate(limit);
        Ok(holds)
    }

    async fn record_sale(
        &self,
        order_id: &str,
        hold_id: Option<&str>,
        lines: &[StockLine],
        now: i64,
    ) -> StoreResult<()> {
        self.write(|txn| {
            decrement_on_hand_in(txn, order_id, lines, now)?;
            if let Some(hold_id) = hold_id
                && let Some(held) = settle_in(txn, hold_id, HoldStatus::Consumed, now)?
            {
                drop_reserved_in(txn, &held, now)?;
            }
            Ok(())
        })
    }

    async fn adjustments(&self, variant_id: &str) -> StoreResult<Vec<InventoryAdjustment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ADJUSTMENTS_TABLE)?;

        let mut adjustments = Vec::new();
        for result in table.range((variant_id, 0u64)..=(variant_id, u64::MAX))? {
            let (_key, value) = result?;
            adjustments.push(decode(value.value())?);
        }
        Ok(adjustments)
    }
}

#[async_trait]
impl OrderStore for EmbeddedStore {
    async fn find_order_by_session(&self, session_id: &str) -> StoreResult<Option<Order>> {
        match self.lookup_index(ORDER_SESSIONS_TABLE, session_id)? {
            Some(order_id) => self.read_json(ORDERS_TABLE, &order_id),
            None => Ok(None),
        }
    }

    async fn find_order_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        match self.lookup_index(ORDER_INTENTS_TABLE, payment_intent_id)? {
            Some(order_id) => self.read_json(ORDERS_TABLE, &order_id),
            None => Ok(None),
        }
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.write(|txn| {
            let mut sessions = txn.open_table(ORDER_SESSIONS_TABLE)?;
            if sessions.get(order.session_id.as_str())?.is_some() {
                return Err(StoreError::DuplicateOrder {
                    session_id: order.session_id.clone(),
                });
            }
            sessions.insert(order.session_id.as_str(), order.id.as_str())?;

            if let Some(intent) = &order.payment_intent_id {
                txn.open_table(ORDER_INTENTS_TABLE)?
                    .insert(intent.as_str(), order.id.as_str())?;
            }
            txn.open_table(ORDERS_TABLE)?
                .insert(order.id.as_str(), encode(order)?.as_slice())?;
            Ok(())
        })
    }

    async fn update_order_state(
        &self,
        order_id: &str,
        update: &OrderStateUpdate,
        now: i64,
    ) -> StoreResult<bool> {
        self.write(|txn| {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            let order: Option<Order> = match table.get(order_id)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let Some(mut order) = order else {
                return Ok(false);
            };
            if let Some(status) = update.status {
                order.status = status;
            }
            if let Some(payment_status) = update.payment_status {
                order.payment_status = payment_status;
            }
            if let Some(refunded) = update.refunded {
                order.amounts.refunded = refunded;
            }
            order.updated_at = now;
            table.insert(order_id, encode(&order)?.as_slice())?;
            Ok(true)
        })
    }
}

#[async_trait]
impl EventLedgerStore for EmbeddedStore {
    async fn claim_event(
        &self,
        event_key: &str,
        event_type: &str,
        now: i64,
        lease_cutoff: i64,
    ) -> StoreResult<ClaimOutcome> {
        self.write(|txn| {
            let mut table = txn.open_table(EVENTS_TABLE)?;
            let existing: Option<ProcessedEvent> = match table.get(event_key)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };

            let claimable = match &existing {
                None => true,
                Some(e) => match e.status {
                    EventStatus::Failed => true,
                    EventStatus::Processing => e.claimed_at < lease_cutoff,
                    EventStatus::Processed => false,
                },
            };
            if !claimable {
                return Ok(match existing.map(|e| e.status) {
                    Some(EventStatus::Processed) => ClaimOutcome::AlreadyProcessed,
                    _ => ClaimOutcome::InFlight,
                });
            }

            let claimed = ProcessedEvent {
                event_key: event_key.to_string(),
                event_type: existing
                    .map(|e| e.event_type)
                    .unwrap_or_else(|| event_type.to_string()),
                status: EventStatus::Processing,
                claimed_at: now,
                processed_at: None,
                last_error: None,
            };
            table.insert(event_key, encode(&claimed)?.as_slice())?;
            Ok(ClaimOutcome::Claimed)
        })
    }

    async fn finish_event(
        &self,
        event_key: &str,
        status: EventStatus,
        error: Option<&str>,
        now: i64,
    ) -> StoreResult<()> {
        self.write(|txn| {
            let mut table = txn.open_table(EVENTS_TABLE)?;
            let existing: Option<ProcessedEvent> = match table.get(event_key)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            if let Some(mut event) = existing {
                event.status = status;
                event.last_error = error.map(str::to_string);
                event.processed_at = Some(now);
                table.insert(event_key, encode(&event)?.as_slice())?;
            }
            Ok(())
        })
    }

    async fn find_event(&self, event_key: &str) -> StoreResult<Option<ProcessedEvent>> {
        self.read_json(EVENTS_TABLE, event_key)
    }
}

#[async_trait]
impl CatalogStore for EmbeddedStore {
    async fn find_variants(&self, ids: &[String]) -> StoreResult<Vec<Variant>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VARIANTS_TABLE)?;

        let mut variants = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(guard) = table.get(id.as_str())? {
                variants.push(decode(guard.value())?);
            }
        }
        Ok(variants)
    }

    async fn find_customer(&self, customer_id: &str) -> StoreResult<Option<Customer>> {
        self.read_json(CUSTOMERS_TABLE, customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str) -> Variant {
        Variant {
            id: id.to_string(),
            product_id: format!("prod_{id}"),
            name: format!("Variant {id}"),
            unit_amount: 1000,
            active: true,
        }
    }

    fn seeded(stock: &[(&str, i64)]) -> EmbeddedStore {
        let store = EmbeddedStore::open_in_memory().unwrap();
        for (id, qty) in stock {
            store.put_variant(&variant(id), *qty).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let store = seeded(&[("a", 5), ("b", 1)]);

        let err = store
            .reserve(&[StockLine::new("a", 2), StockLine::new("b", 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientInventory { variant_id } if variant_id == "b"));

        assert_eq!(store.inventory("a").await.unwrap().unwrap().reserved, 0);
        assert_eq!(store.inventory("b").await.unwrap().unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_reserve_unknown_variant_fails() {
        let store = seeded(&[]);
        let err = store.reserve(&[StockLine::new("ghost", 1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientInventory { .. }));
    }

    #[tokio::test]
    async fn test_release_skips_lines_without_reservation() {
        let store = seeded(&[("a", 5), ("b", 5)]);
        store.reserve(&[StockLine::new("a", 2)]).await.unwrap();

        let applied = store
            .release(&[StockLine::new("a", 2), StockLine::new("b", 1)])
            .await
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(store.inventory("b").await.unwrap().unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_hold_settles_once() {
        let store = seeded(&[("a", 5)]);
        store.reserve_hold("h1", &[StockLine::new("a", 3)], 10).await.unwrap();
        assert!(store.attach_session("h1", "cs_1", 11).await.unwrap());
        assert!(!store.attach_session("h1", "cs_2", 12).await.unwrap());

        let hold = store.find_hold_by_session("cs_1").await.unwrap().unwrap();
        assert_eq!(hold.hold_id, "h1");

        assert!(store.release_hold("h1", 20).await.unwrap());
        assert!(!store.release_hold("h1", 21).await.unwrap());
        assert_eq!(store.inventory("a").await.unwrap().unwrap().reserved, 0);
        assert_eq!(
            store.find_hold("h1").await.unwrap().unwrap().status,
            HoldStatus::Released
        );
    }

    #[tokio::test]
    async fn test_record_sale_consumes_hold() {
        let store = seeded(&[("a", 5)]);
        let lines = [StockLine::new("a", 2)];
        store.reserve_hold("h1", &lines, 10).await.unwrap();

        store.record_sale("ord_1", Some("h1"), &lines, 20).await.unwrap();

        let inv = store.inventory("a").await.unwrap().unwrap();
        assert_eq!(inv.quantity_on_hand, 3);
        assert_eq!(inv.reserved, 0);

        let adjustments = store.adjustments("a").await.unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].delta, -2);
        assert_eq!(adjustments[0].reason, AdjustmentReason::Sale);
        assert_eq!(adjustments[0].order_id.as_deref(), Some("ord_1"));

        // a released hold is not consumed again
        assert!(!store.release_hold("h1", 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_sale_floors_at_zero() {
        let store = seeded(&[("a", 1)]);
        store
            .record_sale("ord_1", None, &[StockLine::new("a", 4)], 20)
            .await
            .unwrap();
        assert_eq!(store.inventory("a").await.unwrap().unwrap().quantity_on_hand, 0);
    }

    #[tokio::test]
    async fn test_stale_holds_filters_and_orders() {
        let store = seeded(&[("a", 10)]);
        let lines = [StockLine::new("a", 1)];
        store.reserve_hold("late", &lines, 30).await.unwrap();
        store.reserve_hold("early", &lines, 10).await.unwrap();
        store.reserve_hold("fresh", &lines, 100).await.unwrap();
        store.reserve_hold("gone", &lines, 5).await.unwrap();
        store.release_hold("gone", 6).await.unwrap();

        let stale = store.stale_holds(50, 10).await.unwrap();
        let ids: Vec<_> = stale.iter().map(|h| h.hold_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        assert_eq!(store.stale_holds(50, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_event_states() {
        let store = seeded(&[]);

        assert_eq!(
            store.claim_event("evt_1", "checkout.session.completed", 100, 0).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            store.claim_event("evt_1", "checkout.session.completed", 101, 0).await.unwrap(),
            ClaimOutcome::InFlight
        );

        store
            .finish_event("evt_1", EventStatus::Failed, Some("boom"), 102)
            .await
            .unwrap();
        let failed = store.find_event("evt_1").await.unwrap().unwrap();
        assert_eq!(failed.last_error.as_deref(), Some("boom"));

        assert_eq!(
            store.claim_event("evt_1", "checkout.session.completed", 103, 0).await.unwrap(),
            ClaimOutcome::Claimed
        );
        store
            .finish_event("evt_1", EventStatus::Processed, None, 104)
            .await
            .unwrap();
        assert_eq!(
            store.claim_event("evt_1", "checkout.session.completed", 105, 1_000).await.unwrap(),
            ClaimOutcome::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn test_claim_event_reclaims_expired_lease() {
        let store = seeded(&[]);
        store.claim_event("evt_1", "t", 100, 0).await.unwrap();

        assert_eq!(
            store.claim_event("evt_1", "t", 150, 100).await.unwrap(),
            ClaimOutcome::InFlight
        );
        assert_eq!(
            store.claim_event("evt_1", "t", 200, 101).await.unwrap(),
            ClaimOutcome::Claimed
        );
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fulfillment.redb");
        {
            let store = EmbeddedStore::open(&path).unwrap();
            store.put_variant(&variant("a"), 7).unwrap();
        }
        let store = EmbeddedStore::open(&path).unwrap();
        assert_eq!(store.inventory("a").await.unwrap().unwrap().quantity_on_hand, 7);
    }
}
