//! PostgreSQL access layer

pub mod catalog;
pub mod events;
pub mod holds;
pub mod inventory;
pub mod orders;
