//! Storage seams
//!
//! All mutual exclusion lives here, never in application code:
//! - stock reservation is a guarded update (compare-and-swap on `reserved`)
//! - "one order per session" is a uniqueness constraint on `session_id`
//! - side-effect dedup is an insert-if-absent on the event key
//!
//! Two backends implement the same traits: [`postgres::PgStore`] for
//! production and [`embedded::EmbeddedStore`] (redb) for local development
//! and tests.

pub mod embedded;
pub mod postgres;

use async_trait::async_trait;
use shared::catalog::{Customer, Variant};
use shared::event::{ClaimOutcome, EventStatus, ProcessedEvent};
use shared::inventory::{CheckoutHold, InventoryAdjustment, StockLine, VariantInventory};
use shared::order::{Order, OrderStatus, PaymentStatus};
use thiserror::Error;

pub use embedded::EmbeddedStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Embedded database error: {0}")]
    EmbeddedDatabase(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A reservation batch could not be applied; nothing was reserved
    #[error("Insufficient inventory for variant {variant_id}")]
    InsufficientInventory { variant_id: String },

    /// Lost the insert race for this session id
    #[error("Order already exists for session {session_id}")]
    DuplicateOrder { session_id: String },

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Partial update applied by webhook-driven transitions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderStateUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    /// New cumulative refunded amount
    pub refunded: Option<i64>,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn inventory(&self, variant_id: &str) -> StoreResult<Option<VariantInventory>>;

    /// Move `quantity` from available to reserved for every line, or for none.
    ///
    /// Fails with [`StoreError::InsufficientInventory`] naming the first line
    /// that did not fit.
    async fn reserve(&self, lines: &[StockLine]) -> StoreResult<()>;

    /// Decrement `reserved` per line, skipping lines whose `reserved` is
    /// below the quantity. Returns the number of lines applied.
    async fn release(&self, lines: &[StockLine]) -> StoreResult<u64>;

    /// [`InventoryStore::reserve`] plus a `held` hold row, in one transaction.
    async fn reserve_hold(&self, hold_id: &str, lines: &[StockLine], now: i64)
    -> StoreResult<()>;

    async fn attach_session(&self, hold_id: &str, session_id: &str, now: i64)
    -> StoreResult<bool>;

    async fn find_hold(&self, hold_id: &str) -> StoreResult<Option<CheckoutHold>>;

    async fn find_hold_by_session(&self, session_id: &str) -> StoreResult<Option<CheckoutHold>>;

    /// `held -> released`, returning the hold's stock to available.
    /// False when the hold is not currently held.
    async fn release_hold(&self, hold_id: &str, now: i64) -> StoreResult<bool>;

    /// Holds still `held` that were created before `created_before`
    async fn stale_holds(&self, created_before: i64, limit: usize)
    -> StoreResult<Vec<CheckoutHold>>;

    /// Sale reconciliation in one transaction: decrement `quantity_on_hand`
    /// (floored at zero) and append a `sale` adjustment per line; when
    /// `hold_id` is still held, move it to `consumed` and drop its quantities
    /// from `reserved` (floored at zero).
    async fn record_sale(
        &self,
        order_id: &str,
        hold_id: Option<&str>,
        lines: &[StockLine],
        now: i64,
    ) -> StoreResult<()>;

    async fn adjustments(&self, variant_id: &str) -> StoreResult<Vec<InventoryAdjustment>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order_by_session(&self, session_id: &str) -> StoreResult<Option<Order>>;

    async fn find_order_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> StoreResult<Option<Order>>;

    /// Insert the order and its items as one create.
    ///
    /// Fails with [`StoreError::DuplicateOrder`] when an order for the same
    /// session already exists.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    /// Apply a status transition. False when the order does not exist.
    async fn update_order_state(
        &self,
        order_id: &str,
        update: &OrderStateUpdate,
        now: i64,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait EventLedgerStore: Send + Sync {
    /// Atomic test-and-set on `event_key`.
    ///
    /// Claims when the key is absent, `failed`, or `processing` with
    /// `claimed_at < lease_cutoff`.
    async fn claim_event(
        &self,
        event_key: &str,
        event_type: &str,
        now: i64,
        lease_cutoff: i64,
    ) -> StoreResult<ClaimOutcome>;

    /// Move a claimed key to `processed` or `failed`
    async fn finish_event(
        &self,
        event_key: &str,
        status: EventStatus,
        error: Option<&str>,
        now: i64,
    ) -> StoreResult<()>;

    async fn find_event(&self, event_key: &str) -> StoreResult<Option<ProcessedEvent>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Variants for the given ids; unknown ids are simply absent
    async fn find_variants(&self, ids: &[String]) -> StoreResult<Vec<Variant>>;

    async fn find_customer(&self, customer_id: &str) -> StoreResult<Option<Customer>>;
}

/// Everything the fulfillment services need from storage
pub trait Store: InventoryStore + OrderStore + EventLedgerStore + CatalogStore {}

impl<T> Store for T where T: InventoryStore + OrderStore + EventLedgerStore + CatalogStore {}
