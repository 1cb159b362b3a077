//! Provider event handling
//!
//! Each provider event id is claimed through the [`EventLedger`] before its
//! handler runs. A failing handler marks the event `failed` and returns the
//! error, so the provider's redelivery can reclaim it.

use serde_json::Value;
use shared::error::AppError;
use shared::event::ClaimOutcome;
use shared::order::{OrderStatus, PaymentStatus};
use std::sync::Arc;

use super::{EventLedger, OrderMaterializer, ReservationManager};
use crate::error::ServiceResult;
use crate::store::{OrderStateUpdate, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Handled,
    /// Event type this service does not act on
    Ignored,
    /// Already processed, or another worker owns it
    Duplicate,
}

const HANDLED_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
    "checkout.session.async_payment_failed",
    "checkout.session.expired",
    "payment_intent.payment_failed",
    "charge.refunded",
    "payment_intent.refunded",
];

/// State change for a refund of `amount_refunded` against `amount_total`
pub fn refund_update(amount_refunded: i64, amount_total: i64) -> OrderStateUpdate {
    OrderStateUpdate {
        status: None,
        payment_status: Some(PaymentStatus::for_refund(amount_refunded, amount_total)),
        refunded: Some(amount_refunded),
    }
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj[key].as_str().filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn Store>,
    ledger: EventLedger,
    materializer: OrderMaterializer,
    reservations: ReservationManager,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: EventLedger,
        materializer: OrderMaterializer,
        reservations: ReservationManager,
    ) -> Self {
        Self {
            store,
            ledger,
            materializer,
            reservations,
        }
    }

    /// Process one verified event payload
    pub async fn process(&self, event: &Value) -> ServiceResult<WebhookOutcome> {
        let event_id = str_field(event, "id")
            .ok_or_else(|| AppError::invalid_request("Webhook event missing id"))?;
        let event_type = event["type"].as_str().unwrap_or_default();

        if !HANDLED_EVENTS.contains(&event_type) {
            tracing::debug!(event_type = event_type, "Unhandled webhook event type");
            return Ok(WebhookOutcome::Ignored);
        }

        match self.ledger.claim(event_id, event_type).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::InFlight | ClaimOutcome::AlreadyProcessed => {
                tracing::info!(event_id = event_id, event_type = event_type, "Duplicate webhook event, skipping");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let object = &event["data"]["object"];
        match self.dispatch(event_type, object).await {
            Ok(()) => {
                self.ledger.complete(event_id).await?;
                tracing::info!(event_id = event_id, event_type = event_type, "Webhook event processed");
                Ok(WebhookOutcome::Handled)
            }
            Err(e) => {
                if let Err(ledger_err) = self.ledger.fail(event_id, &e.to_string()).await {
                    tracing::error!(event_id = event_id, error = %ledger_err, "Failed to mark event failed");
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, event_type: &str, object: &Value) -> ServiceResult<()> {
        match event_type {
            "checkout.session.completed" => self.on_session_completed(object, false).await,
            "checkout.session.async_payment_succeeded" => {
                self.on_session_completed(object, true).await
            }
            "checkout.session.async_payment_failed" => self.on_async_payment_failed(object).await,
            "checkout.session.expired" => self.on_session_expired(object).await,
            "payment_intent.payment_failed" => self.on_payment_intent_failed(object).await,
            "charge.refunded" => {
                let amount_total = object["amount_captured"]
                    .as_i64()
                    .or_else(|| object["amount"].as_i64());
                self.on_refund(
                    str_field(object, "payment_intent"),
                    object["amount_refunded"].as_i64(),
                    amount_total,
                )
                .await
            }
            "payment_intent.refunded" => {
                let amount_total = object["amount_received"]
                    .as_i64()
                    .or_else(|| object["amount"].as_i64());
                let amount_refunded = object["amount_refunded"]
                    .as_i64()
                    .or_else(|| object["latest_charge"]["amount_refunded"].as_i64());
                self.on_refund(str_field(object, "id"), amount_refunded, amount_total)
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn on_session_completed(&self, session: &Value, async_success: bool) -> ServiceResult<()> {
        let session_id = str_field(session, "id")
            .ok_or_else(|| AppError::invalid_request("Checkout session event missing id"))?;

        let materialized = self.materializer.materialize(session_id, None).await?;

        let order = materialized.order();
        if async_success && order.payment_status != PaymentStatus::Paid {
            let update = OrderStateUpdate {
                payment_status: Some(PaymentStatus::Paid),
                ..Default::default()
            };
            self.store
                .update_order_state(&order.id, &update, shared::util::now_millis())
                .await?;
            tracing::info!(order_id = %order.id, session_id = session_id, "Async payment succeeded");
        }
        Ok(())
    }

    async fn release_for_session(&self, session: &Value, session_id: &str) -> ServiceResult<bool> {
        if self.reservations.release_session_hold(session_id).await? {
            return Ok(true);
        }
        match str_field(&session["metadata"], "hold_id") {
            Some(hold_id) => self.reservations.release_hold(hold_id).await,
            None => Ok(false),
        }
    }

    async fn on_async_payment_failed(&self, session: &Value) -> ServiceResult<()> {
        let session_id = str_field(session, "id")
            .ok_or_else(|| AppError::invalid_request("Checkout session event missing id"))?;

        if let Some(order) = self.store.find_order_by_session(session_id).await? {
            let update = OrderStateUpdate {
                status: Some(OrderStatus::Failed),
                payment_status: Some(PaymentStatus::Failed),
                refunded: None,
            };
            self.store
                .update_order_state(&order.id, &update, shared::util::now_millis())
                .await?;
            tracing::info!(order_id = %order.id, session_id = session_id, "Async payment failed");
        }
        self.release_for_session(session, session_id).await?;
        Ok(())
    }

    async fn on_session_expired(&self, session: &Value) -> ServiceResult<()> {
        let session_id = str_field(session, "id")
            .ok_or_else(|| AppError::invalid_request("Checkout session event missing id"))?;
        if self.release_for_session(session, session_id).await? {
            tracing::info!(session_id = session_id, "Expired session released its hold");
        }
        Ok(())
    }

    async fn on_payment_intent_failed(&self, intent: &Value) -> ServiceResult<()> {
        let Some(intent_id) = str_field(intent, "id") else {
            return Ok(());
        };
        let Some(order) = self.store.find_order_by_payment_intent(intent_id).await? else {
            tracing::debug!(payment_intent = intent_id, "Payment failure for unknown order");
            return Ok(());
        };
        let update = OrderStateUpdate {
            payment_status: Some(PaymentStatus::Failed),
            ..Default::default()
        };
        self.store
            .update_order_state(&order.id, &update, shared::util::now_millis())
            .await?;
        tracing::info!(order_id = %order.id, payment_intent = intent_id, "Payment failed");
        Ok(())
    }

    async fn on_refund(
        &self,
        payment_intent: Option<&str>,
        amount_refunded: Option<i64>,
        amount_total: Option<i64>,
    ) -> ServiceResult<()> {
        let Some(intent_id) = payment_intent else {
            tracing::warn!("Refund event without payment intent");
            return Ok(());
        };
        let Some(order) = self.store.find_order_by_payment_intent(intent_id).await? else {
            tracing::warn!(payment_intent = intent_id, "Refund for unknown order");
            return Ok(());
        };

        let Some(refunded) = amount_refunded else {
            tracing::warn!(order_id = %order.id, payment_intent = intent_id, "Refund event without refunded amount, skipping");
            return Ok(());
        };
        let total = amount_total.unwrap_or(order.amounts.total);
        let update = refund_update(refunded, total);
        self.store
            .update_order_state(&order.id, &update, shared::util::now_millis())
            .await?;
        tracing::info!(
            order_id = %order.id,
            refunded,
            total,
            payment_status = ?update.payment_status,
            "Refund recorded"
        );
        Ok(())
    }
}
