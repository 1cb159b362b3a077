//! Inventory model: per-variant stock counters, checkout holds and the
//! append-only adjustment ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stock counters for one sellable variant
///
/// `reserved <= quantity_on_hand` holds after every successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantInventory {
    pub variant_id: String,
    /// Physical stock
    pub quantity_on_hand: i64,
    /// Stock provisionally held by in-flight checkouts
    pub reserved: i64,
    pub updated_at: i64,
}

impl VariantInventory {
    pub fn new(variant_id: impl Into<String>, quantity_on_hand: i64, now: i64) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity_on_hand,
            reserved: 0,
            updated_at: now,
        }
    }

    /// The only quantity ever shown to buyers
    pub fn available(&self) -> i64 {
        (self.quantity_on_hand - self.reserved).max(0)
    }
}

/// A (variant, quantity) pair moved between available and reserved stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub variant_id: String,
    pub quantity: i64,
}

impl StockLine {
    pub fn new(variant_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity,
        }
    }
}

/// Sum quantities per variant.
///
/// Output is ordered by variant id so every writer touches inventory rows in
/// the same order.
pub fn aggregate_lines<'a, I>(lines: I) -> Vec<StockLine>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for (variant_id, quantity) in lines {
        let total = totals.entry(variant_id).or_insert(0);
        *total = total.saturating_add(quantity);
    }
    totals
        .into_iter()
        .map(|(variant_id, quantity)| StockLine::new(variant_id, quantity))
        .collect()
}

/// Why physical stock changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Confirmed sale
    Sale,
    /// Supplier feed correction
    SupplierScrape,
    /// Manual restock
    Restock,
}

impl AdjustmentReason {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(Self::Sale),
            "supplier_scrape" => Some(Self::SupplierScrape),
            "restock" => Some(Self::Restock),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::SupplierScrape => "supplier_scrape",
            Self::Restock => "restock",
        }
    }
}

/// Immutable audit row; never mutated or deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustment {
    pub id: String,
    pub variant_id: String,
    pub order_id: Option<String>,
    /// Signed change to `quantity_on_hand`
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub created_at: i64,
}

/// Lifecycle of a checkout hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    /// Stock is counted in `reserved`
    Held,
    /// Returned to available stock
    Released,
    /// Converted into a sale
    Consumed,
}

impl HoldStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "held" => Some(Self::Held),
            "released" => Some(Self::Released),
            "consumed" => Some(Self::Consumed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Released => "released",
            Self::Consumed => "consumed",
        }
    }
}

/// Stock reserved for one checkout attempt.
///
/// Created together with the reservation; linked to the provider session
/// once the session exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutHold {
    pub hold_id: String,
    pub session_id: Option<String>,
    pub lines: Vec<StockLine>,
    pub status: HoldStatus,
    pub created_at: i64,
    pub updated_at: i64,
}
