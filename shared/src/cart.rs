//! Checkout request/response shapes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cart line as submitted by the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub variant_id: String,
    pub quantity: i64,
    /// Selected options (e.g. size, colour), snapshotted onto the order item
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl CartLine {
    pub fn new(variant_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity,
            options: BTreeMap::new(),
        }
    }
}

/// POST /api/checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// ISO 3166-1 alpha-2 destination country
    pub country: String,
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Cart contents from the storefront session
    #[serde(default)]
    pub items: Vec<CartLine>,
}

/// Hosted checkout redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

/// POST /api/checkout/confirm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_request_defaults() {
        let req: CheckoutRequest = serde_json::from_str(r#"{"country":"ES"}"#).unwrap();
        assert_eq!(req.country, "ES");
        assert!(req.discount_code.is_none());
        assert!(req.items.is_empty());
    }

    #[test]
    fn test_checkout_request_camel_case() {
        let req: CheckoutRequest = serde_json::from_str(
            r#"{"country":"FR","discountCode":"WELCOME","items":[{"variantId":"v1","quantity":2,"options":{"size":"M"}}]}"#,
        )
        .unwrap();
        assert_eq!(req.discount_code.as_deref(), Some("WELCOME"));
        assert_eq!(req.items[0].variant_id, "v1");
        assert_eq!(req.items[0].options.get("size").map(String::as_str), Some("M"));
    }
}
