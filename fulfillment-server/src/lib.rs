//! fulfillment-server: storefront checkout and order fulfillment
//!
//! - Reserves stock atomically while a buyer pays
//! - Opens provider checkout sessions and materializes orders exactly once
//! - Records provider events in an idempotency ledger
//! - Sends abandoned-checkout reminders from a cron endpoint

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod provider;
pub mod services;
pub mod state;
pub mod store;
