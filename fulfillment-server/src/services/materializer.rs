//! Order Materializer
//!
//! `materialize(session_id)` is idempotent and safe to run concurrently from
//! the confirm endpoint and the webhook. At most one order per session is
//! enforced by the store (unique session id); the losing writer re-reads and
//! returns the winner's row.

use shared::error::{AppError, ErrorCode};
use shared::inventory::{StockLine, aggregate_lines};
use shared::order::{Order, OrderItem, OrderStatus, PaymentStatus};
use std::collections::HashMap;
use std::sync::Arc;

use super::ReservationManager;
use crate::email::Mailer;
use crate::error::ServiceResult;
use crate::provider::{PaymentProvider, ProviderLineItem, SessionDetail, SessionStatus};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// This call created the order
    Created(Order),
    /// The order already existed (earlier call or concurrent winner)
    Existing(Order),
}

impl Materialized {
    pub fn order(&self) -> &Order {
        match self {
            Self::Created(o) | Self::Existing(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Self::Created(o) | Self::Existing(o) => o,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Clone)]
pub struct OrderMaterializer {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    mailer: Arc<dyn Mailer>,
    reservations: ReservationManager,
}

/// Caller must own the session's buyer back-reference
fn check_buyer(owner: Option<&str>, caller: &str, session_id: &str) -> ServiceResult<()> {
    match owner {
        None => Err(AppError::new(ErrorCode::MissingBuyerReference)
            .with_detail("session_id", session_id)
            .into()),
        Some(owner) if owner != caller => {
            tracing::warn!(session_id = session_id, "Confirm rejected: session belongs to another buyer");
            Err(AppError::permission_denied("Checkout session belongs to another customer").into())
        }
        Some(_) => Ok(()),
    }
}

impl OrderMaterializer {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        mailer: Arc<dyn Mailer>,
        reservations: ReservationManager,
    ) -> Self {
        Self {
            store,
            provider,
            mailer,
            reservations,
        }
    }

    /// Create the order for `session_id` once.
    ///
    /// With `required_buyer`, the session (or existing order) must carry
    /// that buyer as its back-reference.
    pub async fn materialize(
        &self,
        session_id: &str,
        required_buyer: Option<&str>,
    ) -> ServiceResult<Materialized> {
        if let Some(order) = self.store.find_order_by_session(session_id).await? {
            if let Some(caller) = required_buyer {
                check_buyer(order.customer_id.as_deref(), caller, session_id)?;
            }
            return Ok(Materialized::Existing(order));
        }

        let session = self
            .provider
            .retrieve_session(session_id)
            .await?
            .ok_or_else(|| {
                AppError::new(ErrorCode::SessionNotFound).with_detail("session_id", session_id)
            })?;

        if let Some(caller) = required_buyer {
            check_buyer(session.user_id.as_deref(), caller, session_id)?;
        }
        if session.status != SessionStatus::Complete {
            return Err(AppError::new(ErrorCode::SessionNotComplete)
                .with_detail("session_id", session_id)
                .into());
        }

        let line_items = self.provider.list_line_items(session_id).await?;
        let order = self.build_order(&session, line_items).await?;

        match self.store.insert_order(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateOrder { .. }) => {
                tracing::info!(session_id = session_id, "Order materialized concurrently, returning winner");
                return match self.store.find_order_by_session(session_id).await? {
                    Some(winner) => Ok(Materialized::Existing(winner)),
                    None => Err(AppError::internal(format!(
                        "Order for session {session_id} vanished after duplicate insert"
                    ))
                    .into()),
                };
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            session_id = session_id,
            order_id = %order.id,
            total = order.amounts.total,
            "Order materialized"
        );

        self.reconcile_stock(&order, session.hold_id.as_deref()).await;
        self.send_confirmation(&order).await;

        Ok(Materialized::Created(order))
    }

    /// Resolve provider line-item metadata against the catalog
    async fn build_order(
        &self,
        session: &SessionDetail,
        line_items: Vec<ProviderLineItem>,
    ) -> ServiceResult<Order> {
        let mut ids: Vec<String> = line_items
            .iter()
            .filter_map(|li| li.variant_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        let catalog: HashMap<String, String> = self
            .store
            .find_variants(&ids)
            .await?
            .into_iter()
            .map(|v| (v.id, v.product_id))
            .collect();

        let items = line_items
            .into_iter()
            .map(|li| {
                let resolved = li
                    .variant_id
                    .as_ref()
                    .and_then(|id| catalog.get(id).map(|product_id| (id.clone(), product_id.clone())));
                let (variant_id, product_id) = match resolved {
                    Some((variant_id, product_id)) => (Some(variant_id), Some(product_id)),
                    None => (None, None),
                };
                OrderItem {
                    name: li.name,
                    quantity: li.quantity,
                    unit_amount: li.unit_amount,
                    total_amount: li.amount_total,
                    product_id,
                    variant_id,
                    options: li.options,
                }
            })
            .collect();

        let now = shared::util::now_millis();
        Ok(Order {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            customer_id: session.user_id.clone(),
            customer_email: session.customer_email.clone(),
            payment_intent_id: session.payment_intent_id.clone(),
            currency: session.currency.clone(),
            amounts: session.amounts.clone(),
            status: OrderStatus::Complete,
            payment_status: if session.payment_status.is_settled() {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Unpaid
            },
            shipping_address: session.shipping_address.clone(),
            discount_code: session.discount_code.clone(),
            items,
            created_at: now,
            updated_at: now,
        })
    }

    /// Best effort: the order is authoritative even if this fails
    async fn reconcile_stock(&self, order: &Order, hold_hint: Option<&str>) {
        let lines: Vec<StockLine> = aggregate_lines(
            order
                .items
                .iter()
                .filter_map(|i| i.variant_id.as_deref().map(|v| (v, i.quantity))),
        );
        if let Err(e) = self
            .reservations
            .consume_session_hold(&order.session_id, hold_hint, &order.id, &lines)
            .await
        {
            tracing::error!(
                order_id = %order.id,
                session_id = %order.session_id,
                error = %e,
                "Reconciliation decrement failed"
            );
        }
    }

    async fn send_confirmation(&self, order: &Order) {
        let Some(to) = order.customer_email.as_deref() else {
            return;
        };
        if let Err(e) = self.mailer.send_order_confirmation(to, order).await {
            tracing::warn!(order_id = %order.id, error = %e, "Order confirmation email failed");
        }
    }
}
