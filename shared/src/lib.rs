//! Shared types for the storefront fulfillment workspace
//!
//! Error codes, API response envelopes and the commerce data model
//! (inventory, carts, orders, processed events) used by the server and
//! its tests.

pub mod cart;
pub mod catalog;
pub mod error;
pub mod event;
pub mod inventory;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
