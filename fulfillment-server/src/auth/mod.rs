//! Request authentication: customer JWTs and the cron shared secret

pub mod cron_auth;
pub mod customer_auth;

pub use customer_auth::CustomerIdentity;
