//! Payment provider seam
//!
//! The provider is an opaque external system reached through a hosted
//! checkout session API and a signed event push. [`StripeClient`] is the
//! production implementation; tests supply their own.

pub mod signature;
pub mod stripe;

use async_trait::async_trait;
use shared::order::{OrderAmounts, ShippingAddress};
use std::collections::BTreeMap;
use thiserror::Error;

pub use signature::{SignatureError, verify_webhook_signature};
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// One priced line sent to the hosted checkout page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub variant_id: String,
    pub product_id: String,
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Reservation backing this session, echoed back in metadata
    pub hold_id: String,
    /// Buyer back-reference; `None` for guest checkout
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    pub currency: String,
    pub lines: Vec<SessionLine>,
    pub shipping_amount: i64,
    pub shipping_country: String,
    pub promotion_code_id: Option<String>,
    pub discount_code: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Unix seconds
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
}

impl SessionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "complete" => Some(Self::Complete),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl SessionPaymentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(Self::Paid),
            "unpaid" => Some(Self::Unpaid),
            "no_payment_required" => Some(Self::NoPaymentRequired),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Unpaid)
    }
}

/// Full session detail used by materialization and recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetail {
    pub id: String,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    pub customer_email: Option<String>,
    pub user_id: Option<String>,
    pub hold_id: Option<String>,
    pub currency: String,
    /// `refunded` is always zero here
    pub amounts: OrderAmounts,
    pub payment_intent_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub discount_code: Option<String>,
    pub recovery_url: Option<String>,
    /// Unix seconds
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLineItem {
    pub name: String,
    pub quantity: i64,
    pub unit_amount: i64,
    pub amount_total: i64,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub id: String,
    pub code: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, ProviderError>;

    /// `None` when the provider does not know the id
    async fn retrieve_session(&self, session_id: &str)
    -> Result<Option<SessionDetail>, ProviderError>;

    async fn list_line_items(&self, session_id: &str)
    -> Result<Vec<ProviderLineItem>, ProviderError>;

    /// Most recent sessions created before `created_before` (Unix seconds)
    async fn list_sessions(
        &self,
        created_before: i64,
        limit: usize,
    ) -> Result<Vec<SessionDetail>, ProviderError>;

    /// Active promotion for a customer-facing code
    async fn find_promotion_code(&self, code: &str) -> Result<Option<Promotion>, ProviderError>;
}
