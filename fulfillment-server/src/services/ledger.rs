//! Webhook Event Ledger
//!
//! `(none) -> processing -> processed`, with `failed` reclaimable. Claiming
//! is the only way to own a non-idempotent side effect.

use shared::event::{ClaimOutcome, EventStatus, ProcessedEvent};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceResult;
use crate::store::Store;

/// Deterministic key for a recovery reminder
pub fn recovery_event_key(session_id: &str) -> String {
    format!("checkout_recovery:{session_id}")
}

#[derive(Clone)]
pub struct EventLedger {
    store: Arc<dyn Store>,
    lease: Duration,
}

impl EventLedger {
    pub fn new(store: Arc<dyn Store>, lease: Duration) -> Self {
        Self { store, lease }
    }

    pub async fn claim(&self, event_key: &str, event_type: &str) -> ServiceResult<ClaimOutcome> {
        let now = shared::util::now_millis();
        let lease_cutoff = now - self.lease.as_millis() as i64;
        let outcome = self
            .store
            .claim_event(event_key, event_type, now, lease_cutoff)
            .await?;
        if !outcome.is_claimed() {
            tracing::debug!(event_key = event_key, ?outcome, "Event already owned, skipping");
        }
        Ok(outcome)
    }

    pub async fn complete(&self, event_key: &str) -> ServiceResult<()> {
        self.store
            .finish_event(event_key, EventStatus::Processed, None, shared::util::now_millis())
            .await?;
        Ok(())
    }

    pub async fn fail(&self, event_key: &str, error: &str) -> ServiceResult<()> {
        tracing::warn!(event_key = event_key, error = error, "Event marked failed");
        self.store
            .finish_event(
                event_key,
                EventStatus::Failed,
                Some(error),
                shared::util::now_millis(),
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, event_key: &str) -> ServiceResult<Option<ProcessedEvent>> {
        Ok(self.store.find_event(event_key).await?)
    }
}
