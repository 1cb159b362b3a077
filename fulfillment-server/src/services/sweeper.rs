//! Stale hold sweeper
//!
//! Reclaims stock held by checkouts that outlived their provider session.
//! A hold whose session completed is never released here: the sale is
//! materialized instead, which consumes the hold.

use shared::inventory::CheckoutHold;
use std::sync::Arc;
use std::time::Duration;

use super::{OrderMaterializer, ReservationManager};
use crate::error::ServiceResult;
use crate::provider::{PaymentProvider, SessionStatus};

const SWEEP_BATCH: usize = 200;

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub released: usize,
    pub materialized: usize,
    pub skipped: usize,
}

enum Disposition {
    Released,
    Materialized,
    Skipped,
}

#[derive(Clone)]
pub struct HoldSweeper {
    reservations: ReservationManager,
    provider: Arc<dyn PaymentProvider>,
    materializer: OrderMaterializer,
}

impl HoldSweeper {
    pub fn new(
        reservations: ReservationManager,
        provider: Arc<dyn PaymentProvider>,
        materializer: OrderMaterializer,
    ) -> Self {
        Self {
            reservations,
            provider,
            materializer,
        }
    }

    /// Settle holds still `held` after `max_age`
    pub async fn sweep_stale(&self, max_age: Duration, batch: usize) -> ServiceResult<SweepReport> {
        let stale = self.reservations.stale_holds(max_age, batch).await?;

        let mut report = SweepReport::default();
        for hold in stale {
            match self.settle(&hold).await {
                Ok(Disposition::Released) => report.released += 1,
                Ok(Disposition::Materialized) => report.materialized += 1,
                Ok(Disposition::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(hold_id = %hold.hold_id, error = %e, "Failed to settle stale hold");
                    report.skipped += 1;
                }
            }
        }

        if report.released > 0 || report.materialized > 0 {
            tracing::info!(
                released = report.released,
                materialized = report.materialized,
                skipped = report.skipped,
                "Stale holds swept"
            );
        }
        Ok(report)
    }

    async fn settle(&self, hold: &CheckoutHold) -> ServiceResult<Disposition> {
        let Some(session_id) = hold.session_id.as_deref() else {
            return self.release(hold).await;
        };

        let session = match self.provider.retrieve_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                // unknown outcome: keep the stock held until the next pass
                tracing::warn!(hold_id = %hold.hold_id, session_id, error = %e, "Session lookup failed, hold kept");
                return Ok(Disposition::Skipped);
            }
        };

        match session.map(|s| s.status) {
            Some(SessionStatus::Complete) => {
                let materialized = self.materializer.materialize(session_id, None).await?;
                if materialized.is_created() {
                    tracing::info!(hold_id = %hold.hold_id, session_id, "Completed session materialized by sweeper");
                    Ok(Disposition::Materialized)
                } else {
                    tracing::warn!(
                        hold_id = %hold.hold_id,
                        session_id,
                        order_id = %materialized.order().id,
                        "Completed session still holds stock, left for reconciliation"
                    );
                    Ok(Disposition::Skipped)
                }
            }
            Some(SessionStatus::Open) => {
                // still payable; the provider expires it and a later pass releases
                tracing::debug!(hold_id = %hold.hold_id, session_id, "Session still open, hold kept");
                Ok(Disposition::Skipped)
            }
            Some(SessionStatus::Expired) | None => self.release(hold).await,
        }
    }

    async fn release(&self, hold: &CheckoutHold) -> ServiceResult<Disposition> {
        Ok(if self.reservations.release_hold(&hold.hold_id).await? {
            Disposition::Released
        } else {
            Disposition::Skipped
        })
    }

    /// Periodically sweep stale holds until the runtime shuts down
    pub fn spawn(self, every: Duration, max_age: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep_stale(max_age, SWEEP_BATCH).await {
                    tracing::error!(error = %e, "Hold sweep failed");
                }
            }
        })
    }
}
