//! Order model
//!
//! An order is created exactly once per payment session id and afterwards
//! only moves through provider-driven status transitions.

mod types;

pub use types::{Order, OrderAmounts, OrderItem, OrderStatus, PaymentStatus, ShippingAddress};
