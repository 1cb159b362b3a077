//! Read-only catalog and customer snapshots consumed by checkout

use serde::{Deserialize, Serialize};

/// A purchasable SKU as seen by checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub product_id: String,
    /// Display name (product + option summary)
    pub name: String,
    /// Unit price in minor currency units
    pub unit_amount: i64,
    pub active: bool,
}

/// A registered buyer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub email: String,
    /// Opted into checkout recovery email
    pub reminder_opt_in: bool,
}
