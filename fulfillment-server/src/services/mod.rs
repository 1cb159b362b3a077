//! Fulfillment core
//!
//! All mutual exclusion is delegated to the [`crate::store`] layer; nothing
//! here holds an in-process lock.

pub mod checkout;
pub mod ledger;
pub mod materializer;
pub mod recovery;
pub mod reservation;
pub mod sweeper;
pub mod webhook;

pub use checkout::CheckoutInitiator;
pub use ledger::EventLedger;
pub use materializer::{Materialized, OrderMaterializer};
pub use recovery::{RecoveryReport, RecoveryScheduler};
pub use reservation::ReservationManager;
pub use sweeper::{HoldSweeper, SweepReport};
pub use webhook::WebhookProcessor;
