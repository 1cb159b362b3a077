//! Reservation Manager
//!
//! Moves stock between "available" and "reserved". Every mutation is a
//! guarded update in the store, so concurrent buyers can never reserve more
//! than `quantity_on_hand - reserved`.

use shared::inventory::{CheckoutHold, StockLine};
use std::sync::Arc;
use std::time::Duration;

use shared::error::{AppError, ErrorCode};

use crate::error::ServiceResult;
use crate::store::{Store, StoreError};

/// Every line must move at least one unit
fn check_quantities(lines: &[StockLine]) -> ServiceResult<()> {
    match lines.iter().find(|l| l.quantity <= 0) {
        Some(bad) => Err(AppError::new(ErrorCode::InvalidQuantity)
            .with_detail("variant_id", bad.variant_id.clone())
            .with_detail("quantity", bad.quantity)
            .into()),
        None => Ok(()),
    }
}

#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn Store>,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// All-or-nothing reservation of every line
    pub async fn reserve(&self, lines: &[StockLine]) -> ServiceResult<()> {
        check_quantities(lines)?;
        match self.store.reserve(lines).await {
            Err(StoreError::InsufficientInventory { variant_id }) => {
                tracing::warn!(variant_id = %variant_id, "Reservation rejected: insufficient inventory");
                Err(StoreError::InsufficientInventory { variant_id }.into())
            }
            other => Ok(other?),
        }
    }

    /// Guarded release; lines without a matching reservation are skipped.
    /// Returns the number of lines released.
    pub async fn release(&self, lines: &[StockLine]) -> ServiceResult<u64> {
        check_quantities(lines)?;
        Ok(self.store.release(lines).await?)
    }

    /// Reserve `lines` and record them as a new hold. Returns the hold id.
    pub async fn hold(&self, lines: &[StockLine]) -> ServiceResult<String> {
        check_quantities(lines)?;
        let hold_id = uuid::Uuid::new_v4().to_string();
        match self
            .store
            .reserve_hold(&hold_id, lines, shared::util::now_millis())
            .await
        {
            Ok(()) => {
                tracing::info!(hold_id = %hold_id, lines = lines.len(), "Stock held");
                Ok(hold_id)
            }
            Err(StoreError::InsufficientInventory { variant_id }) => {
                tracing::warn!(variant_id = %variant_id, "Hold rejected: insufficient inventory");
                Err(StoreError::InsufficientInventory { variant_id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn attach_session(&self, hold_id: &str, session_id: &str) -> ServiceResult<bool> {
        Ok(self
            .store
            .attach_session(hold_id, session_id, shared::util::now_millis())
            .await?)
    }

    /// Return a hold's stock to available. False when it was already settled.
    pub async fn release_hold(&self, hold_id: &str) -> ServiceResult<bool> {
        let released = self
            .store
            .release_hold(hold_id, shared::util::now_millis())
            .await?;
        if released {
            tracing::info!(hold_id = %hold_id, "Hold released");
        }
        Ok(released)
    }

    pub async fn release_session_hold(&self, session_id: &str) -> ServiceResult<bool> {
        match self.store.find_hold_by_session(session_id).await? {
            Some(hold) => self.release_hold(&hold.hold_id).await,
            None => Ok(false),
        }
    }

    /// Hold backing `session_id`, falling back to the id echoed in session metadata
    pub async fn session_hold(
        &self,
        session_id: &str,
        hold_hint: Option<&str>,
    ) -> ServiceResult<Option<CheckoutHold>> {
        if let Some(hold) = self.store.find_hold_by_session(session_id).await? {
            return Ok(Some(hold));
        }
        match hold_hint {
            Some(hold_id) => Ok(self.store.find_hold(hold_id).await?),
            None => Ok(None),
        }
    }

    /// Sale reconciliation: decrement physical stock for `lines` and consume
    /// the session's hold, if it is still held.
    pub async fn consume_session_hold(
        &self,
        session_id: &str,
        hold_hint: Option<&str>,
        order_id: &str,
        lines: &[StockLine],
    ) -> ServiceResult<()> {
        let hold = self.session_hold(session_id, hold_hint).await?;
        self.store
            .record_sale(
                order_id,
                hold.as_ref().map(|h| h.hold_id.as_str()),
                lines,
                shared::util::now_millis(),
            )
            .await?;
        Ok(())
    }

    /// Holds still `held` that are older than `max_age`, oldest first
    pub async fn stale_holds(&self, max_age: Duration, batch: usize) -> ServiceResult<Vec<CheckoutHold>> {
        let age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = shared::util::now_millis().saturating_sub(age);
        Ok(self.store.stale_holds(cutoff, batch).await?)
    }
}
