//! Stripe Checkout via REST API (no SDK dependency)

use async_trait::async_trait;
use serde_json::Value;
use shared::order::{OrderAmounts, ShippingAddress};
use std::collections::BTreeMap;

use super::{
    CheckoutSessionRequest, PaymentProvider, ProviderError, ProviderLineItem, ProviderSession,
    Promotion, SessionDetail, SessionPaymentStatus, SessionStatus,
};

const API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe caps list pages at 100
const MAX_PAGE: usize = 100;

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Point the client at another API host (stripe-mock, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>, ProviderError> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(query)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_body(resp).await.map(Some)
    }
}

async fn read_body(resp: reqwest::Response) -> Result<Value, ProviderError> {
    let status = resp.status();
    let body: Value = resp.json().await?;
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    Ok(body)
}

/// Form fields for `POST /v1/checkout/sessions`
pub(crate) fn session_form(req: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), req.success_url.clone()),
        ("cancel_url".into(), req.cancel_url.clone()),
        ("expires_at".into(), req.expires_at.to_string()),
        ("metadata[hold_id]".into(), req.hold_id.clone()),
        (
            "shipping_address_collection[allowed_countries][0]".into(),
            req.shipping_country.to_uppercase(),
        ),
        (
            "shipping_options[0][shipping_rate_data][type]".into(),
            "fixed_amount".into(),
        ),
        (
            "shipping_options[0][shipping_rate_data][display_name]".into(),
            if req.shipping_amount == 0 {
                "Free shipping".into()
            } else {
                "Standard shipping".into()
            },
        ),
        (
            "shipping_options[0][shipping_rate_data][fixed_amount][amount]".into(),
            req.shipping_amount.to_string(),
        ),
        (
            "shipping_options[0][shipping_rate_data][fixed_amount][currency]".into(),
            req.currency.clone(),
        ),
        ("after_expiration[recovery][enabled]".into(), "true".into()),
    ];

    if let Some(user_id) = &req.user_id {
        form.push(("metadata[user_id]".into(), user_id.clone()));
        form.push(("client_reference_id".into(), user_id.clone()));
    }
    if let Some(email) = &req.customer_email {
        form.push(("customer_email".into(), email.clone()));
    }
    match (&req.promotion_code_id, &req.discount_code) {
        (Some(promo), code) => {
            form.push(("discounts[0][promotion_code]".into(), promo.clone()));
            if let Some(code) = code {
                form.push(("metadata[discount_code]".into(), code.clone()));
            }
        }
        (None, _) => form.push(("allow_promotion_codes".into(), "false".into())),
    }

    for (i, line) in req.lines.iter().enumerate() {
        let p = format!("line_items[{i}]");
        form.push((format!("{p}[quantity]"), line.quantity.to_string()));
        form.push((format!("{p}[price_data][currency]"), req.currency.clone()));
        form.push((
            format!("{p}[price_data][unit_amount]"),
            line.unit_amount.to_string(),
        ));
        form.push((format!("{p}[price_data][product_data][name]"), line.name.clone()));
        form.push((
            format!("{p}[price_data][product_data][metadata][variant_id]"),
            line.variant_id.clone(),
        ));
        form.push((
            format!("{p}[price_data][product_data][metadata][product_id]"),
            line.product_id.clone(),
        ));
        if !line.options.is_empty() {
            let options = serde_json::to_string(&line.options).unwrap_or_default();
            form.push((
                format!("{p}[price_data][product_data][metadata][options]"),
                options,
            ));
        }
    }
    form
}

fn opt_str(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(String::from)
}

fn parse_address(v: &Value) -> Option<ShippingAddress> {
    let address = &v["address"];
    if !address.is_object() {
        return None;
    }
    Some(ShippingAddress {
        name: opt_str(&v["name"]),
        line1: opt_str(&address["line1"]),
        line2: opt_str(&address["line2"]),
        city: opt_str(&address["city"]),
        state: opt_str(&address["state"]),
        postal_code: opt_str(&address["postal_code"]),
        country: opt_str(&address["country"]),
    })
}

/// Map a Checkout Session object
pub(crate) fn parse_session(v: &Value) -> Result<SessionDetail, ProviderError> {
    let id = opt_str(&v["id"]).ok_or_else(|| ProviderError::Malformed("session id".into()))?;
    let status = v["status"]
        .as_str()
        .and_then(SessionStatus::parse)
        .ok_or_else(|| ProviderError::Malformed(format!("session {id} status")))?;
    let payment_status = v["payment_status"]
        .as_str()
        .and_then(SessionPaymentStatus::parse)
        .ok_or_else(|| ProviderError::Malformed(format!("session {id} payment_status")))?;

    let totals = &v["total_details"];
    let amounts = OrderAmounts {
        subtotal: v["amount_subtotal"].as_i64().unwrap_or(0),
        tax: totals["amount_tax"].as_i64().unwrap_or(0),
        shipping: totals["amount_shipping"].as_i64().unwrap_or(0),
        discount: totals["amount_discount"].as_i64().unwrap_or(0),
        total: v["amount_total"].as_i64().unwrap_or(0),
        refunded: 0,
    };

    // payment_intent is an id, or an object when expanded
    let payment_intent_id = opt_str(&v["payment_intent"]).or_else(|| opt_str(&v["payment_intent"]["id"]));

    // newer API versions moved shipping_details under collected_information
    let shipping_address = parse_address(&v["collected_information"]["shipping_details"])
        .or_else(|| parse_address(&v["shipping_details"]));

    Ok(SessionDetail {
        status,
        payment_status,
        customer_email: opt_str(&v["customer_details"]["email"])
            .or_else(|| opt_str(&v["customer_email"])),
        user_id: opt_str(&v["metadata"]["user_id"]),
        hold_id: opt_str(&v["metadata"]["hold_id"]),
        currency: v["currency"].as_str().unwrap_or_default().to_string(),
        amounts,
        payment_intent_id,
        shipping_address,
        discount_code: opt_str(&v["metadata"]["discount_code"]),
        recovery_url: opt_str(&v["after_expiration"]["recovery"]["url"]),
        created: v["created"].as_i64().unwrap_or(0),
        id,
    })
}

/// Map a line item with `price.product` expanded
pub(crate) fn parse_line_item(v: &Value) -> ProviderLineItem {
    let product = &v["price"]["product"];
    let metadata = &product["metadata"];
    let options: BTreeMap<String, String> = metadata["options"]
        .as_str()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let quantity = v["quantity"].as_i64().unwrap_or(0);
    let amount_total = v["amount_total"].as_i64().unwrap_or(0);
    let unit_amount = v["price"]["unit_amount"]
        .as_i64()
        .unwrap_or_else(|| if quantity > 0 { amount_total / quantity } else { 0 });

    ProviderLineItem {
        name: opt_str(&v["description"])
            .or_else(|| opt_str(&product["name"]))
            .unwrap_or_default(),
        quantity,
        unit_amount,
        amount_total,
        product_id: opt_str(&metadata["product_id"]),
        variant_id: opt_str(&metadata["variant_id"]),
        options,
    }
}

/// Last item id of a list page when the provider reports more pages
fn next_page_cursor(body: &Value) -> Option<&str> {
    if !body["has_more"].as_bool().unwrap_or(false) {
        return None;
    }
    body["data"].as_array()?.last()?["id"].as_str()
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&session_form(request))
            .send()
            .await?;
        let body = read_body(resp).await?;

        match (opt_str(&body["id"]), opt_str(&body["url"])) {
            (Some(id), Some(url)) => Ok(ProviderSession { id, url }),
            _ => Err(ProviderError::Malformed(format!(
                "checkout session without id/url: {body}"
            ))),
        }
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<Option<SessionDetail>, ProviderError> {
        let body = self
            .get(&format!("/checkout/sessions/{session_id}"), &[])
            .await?;
        body.as_ref().map(parse_session).transpose()
    }

    async fn list_line_items(&self, session_id: &str) -> Result<Vec<ProviderLineItem>, ProviderError> {
        let path = format!("/checkout/sessions/{session_id}/line_items");
        let mut items = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query = vec![
                ("limit", MAX_PAGE.to_string()),
                ("expand[]", "data.price.product".to_string()),
            ];
            if let Some(cursor) = &starting_after {
                query.push(("starting_after", cursor.clone()));
            }
            let body = self
                .get(&path, &query)
                .await?
                .ok_or_else(|| ProviderError::Malformed(format!("no line items for {session_id}")))?;

            if let Some(page) = body["data"].as_array() {
                items.extend(page.iter().map(parse_line_item));
            }
            match next_page_cursor(&body) {
                Some(cursor) => starting_after = Some(cursor.to_string()),
                None => break,
            }
        }

        Ok(items)
    }

    async fn list_sessions(
        &self,
        created_before: i64,
        limit: usize,
    ) -> Result<Vec<SessionDetail>, ProviderError> {
        let body = self
            .get(
                "/checkout/sessions",
                &[
                    ("limit", limit.clamp(1, MAX_PAGE).to_string()),
                    ("created[lt]", created_before.to_string()),
                ],
            )
            .await?
            .unwrap_or(Value::Null);

        body["data"]
            .as_array()
            .map(|sessions| sessions.iter().map(parse_session).collect::<Result<Vec<_>, _>>())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn find_promotion_code(&self, code: &str) -> Result<Option<Promotion>, ProviderError> {
        let body = self
            .get(
                "/promotion_codes",
                &[
                    ("code", code.to_string()),
                    ("active", "true".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?
            .unwrap_or(Value::Null);

        Ok(body["data"][0]["id"].as_str().map(|id| Promotion {
            id: id.to_string(),
            code: body["data"][0]["code"].as_str().unwrap_or(code).to_string(),
        }))
    }
}
