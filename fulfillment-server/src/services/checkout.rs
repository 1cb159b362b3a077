//! Checkout Session Initiator
//!
//! validate cart -> hold stock -> open provider session. If the provider
//! call fails the hold is released before the error is returned, so stock
//! is never held without a live session.

use shared::cart::{CartLine, CheckoutRequest, CheckoutResponse};
use shared::catalog::Variant;
use shared::error::{AppError, ErrorCode};
use shared::inventory::aggregate_lines;
use std::collections::HashMap;
use std::sync::Arc;

use super::ReservationManager;
use crate::config::CheckoutPolicy;
use crate::error::ServiceResult;
use crate::provider::{CheckoutSessionRequest, PaymentProvider, SessionLine};
use crate::store::Store;

/// Who is checking out; `None` for guests
#[derive(Debug, Clone, Default)]
pub struct Buyer {
    pub user_id: Option<String>,
    pub email: Option<String>,
}

/// Sum of `unit_amount * quantity`; `None` on overflow
fn cart_subtotal(items: &[CartLine], variants: &HashMap<String, Variant>) -> Option<i64> {
    items.iter().try_fold(0i64, |acc, line| {
        let unit = variants.get(&line.variant_id)?.unit_amount;
        acc.checked_add(unit.checked_mul(line.quantity)?)
    })
}

#[derive(Clone)]
pub struct CheckoutInitiator {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    reservations: ReservationManager,
    policy: CheckoutPolicy,
    success_url: String,
    cancel_url: String,
}

impl CheckoutInitiator {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        reservations: ReservationManager,
        policy: CheckoutPolicy,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            reservations,
            policy,
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        }
    }

    pub fn shipping_for(&self, subtotal: i64) -> i64 {
        if subtotal >= self.policy.free_shipping_threshold {
            0
        } else {
            self.policy.shipping_flat_rate
        }
    }

    /// Resolve every cart line against the catalog
    async fn resolve_variants(&self, items: &[CartLine]) -> ServiceResult<HashMap<String, Variant>> {
        let mut ids: Vec<String> = items.iter().map(|l| l.variant_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let variants: HashMap<String, Variant> = self
            .store
            .find_variants(&ids)
            .await?
            .into_iter()
            .map(|v| (v.id.clone(), v))
            .collect();

        for id in &ids {
            match variants.get(id) {
                Some(v) if v.active => {}
                _ => {
                    return Err(AppError::new(ErrorCode::VariantNotFound)
                        .with_detail("variant_id", id.clone())
                        .into());
                }
            }
        }
        Ok(variants)
    }

    pub async fn initiate(
        &self,
        request: &CheckoutRequest,
        buyer: &Buyer,
    ) -> ServiceResult<CheckoutResponse> {
        let items = &request.items;
        if items.is_empty() {
            return Err(AppError::new(ErrorCode::CartEmpty).into());
        }
        if let Some(bad) = items.iter().find(|l| l.quantity <= 0) {
            return Err(AppError::new(ErrorCode::InvalidQuantity)
                .with_detail("variant_id", bad.variant_id.clone())
                .into());
        }
        if request.country.trim().is_empty() {
            return Err(AppError::validation("Destination country is required").into());
        }

        let variants = self.resolve_variants(items).await?;

        let subtotal = cart_subtotal(items, &variants).ok_or_else(|| {
            tracing::warn!(lines = items.len(), "Cart subtotal overflow");
            AppError::with_message(ErrorCode::InvalidQuantity, "Cart quantities are too large")
        })?;
        if subtotal < self.policy.min_order_value {
            return Err(AppError::new(ErrorCode::BelowMinimumOrder)
                .with_detail("subtotal", subtotal)
                .with_detail("minimum", self.policy.min_order_value)
                .into());
        }

        let discount_code = request
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let promotion = match discount_code {
            Some(code) => match self.provider.find_promotion_code(code).await? {
                Some(promo) => Some(promo),
                None => {
                    tracing::warn!(code = code, "Rejected discount code");
                    return Err(AppError::new(ErrorCode::InvalidDiscount)
                        .with_detail("code", code)
                        .into());
                }
            },
            None => None,
        };

        let lines = aggregate_lines(items.iter().map(|l| (l.variant_id.as_str(), l.quantity)));
        let hold_id = self.reservations.hold(&lines).await?;

        let session_lines = items
            .iter()
            .filter_map(|l| {
                variants.get(&l.variant_id).map(|v| SessionLine {
                    variant_id: v.id.clone(),
                    product_id: v.product_id.clone(),
                    name: v.name.clone(),
                    unit_amount: v.unit_amount,
                    quantity: l.quantity,
                    options: l.options.clone(),
                })
            })
            .collect();

        let now_secs = shared::util::now_secs();
        let session_request = CheckoutSessionRequest {
            hold_id: hold_id.clone(),
            user_id: buyer.user_id.clone(),
            customer_email: buyer.email.clone(),
            currency: self.policy.currency.clone(),
            lines: session_lines,
            shipping_amount: self.shipping_for(subtotal),
            shipping_country: request.country.trim().to_string(),
            promotion_code_id: promotion.map(|p| p.id),
            discount_code: discount_code.map(String::from),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            expires_at: now_secs + self.policy.hold_ttl_minutes * 60,
        };

        let session = match self.provider.create_session(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(hold_id = %hold_id, error = %e, "Checkout session creation failed, releasing hold");
                if let Err(release_err) = self.reservations.release_hold(&hold_id).await {
                    tracing::error!(hold_id = %hold_id, error = %release_err, "Compensating release failed");
                }
                return Err(AppError::new(ErrorCode::ProviderSessionCreateFailed).into());
            }
        };

        // the hold is also reachable through session metadata, so this is not fatal
        if let Err(e) = self.reservations.attach_session(&hold_id, &session.id).await {
            tracing::error!(hold_id = %hold_id, session_id = %session.id, error = %e, "Failed to link hold to session");
        }

        tracing::info!(
            session_id = %session.id,
            hold_id = %hold_id,
            subtotal,
            guest = buyer.user_id.is_none(),
            "Checkout session created"
        );

        Ok(CheckoutResponse {
            url: session.url,
            session_id: session.id,
        })
    }
}
