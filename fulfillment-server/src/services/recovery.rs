//! Recovery Scheduler
//!
//! One pass over abandoned provider sessions. Overlapping passes are safe:
//! a reminder is only sent after winning the ledger claim for
//! `checkout_recovery:{session_id}`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::EventLedger;
use super::ledger::recovery_event_key;
use crate::email::Mailer;
use crate::error::ServiceResult;
use crate::provider::{PaymentProvider, SessionDetail, SessionStatus};
use crate::store::Store;

const RECOVERY_EVENT_TYPE: &str = "checkout_recovery";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Step {
    Sent,
    Skipped(&'static str),
    Failed,
}

#[derive(Clone)]
pub struct RecoveryScheduler {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    mailer: Arc<dyn Mailer>,
    ledger: EventLedger,
    fallback_url: String,
}

impl RecoveryScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        mailer: Arc<dyn Mailer>,
        ledger: EventLedger,
        fallback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            mailer,
            ledger,
            fallback_url: fallback_url.into(),
        }
    }

    /// Scan up to `limit` sessions older than `delay`
    pub async fn run(&self, delay: Duration, limit: usize) -> ServiceResult<RecoveryReport> {
        let delay_secs = i64::try_from(delay.as_secs()).unwrap_or(i64::MAX);
        let created_before = shared::util::now_secs().saturating_sub(delay_secs);
        let sessions = self.provider.list_sessions(created_before, limit).await?;

        let mut report = RecoveryReport::default();
        for session in sessions.iter().take(limit) {
            report.scanned += 1;
            match self.recover(session).await {
                Ok(Step::Sent) => report.sent += 1,
                Ok(Step::Skipped(reason)) => {
                    tracing::debug!(session_id = %session.id, reason, "Recovery skipped");
                    report.skipped += 1;
                }
                Ok(Step::Failed) => report.failed += 1,
                Err(e) => {
                    tracing::error!(session_id = %session.id, error = %e, "Recovery step failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Checkout recovery pass finished"
        );
        Ok(report)
    }

    async fn recover(&self, session: &SessionDetail) -> ServiceResult<Step> {
        if session.status == SessionStatus::Complete {
            return Ok(Step::Skipped("complete"));
        }
        if session.payment_status.is_settled() {
            return Ok(Step::Skipped("paid"));
        }
        let Some(email) = session.customer_email.as_deref() else {
            return Ok(Step::Skipped("no customer"));
        };
        let Some(user_id) = session.user_id.as_deref() else {
            return Ok(Step::Skipped("guest"));
        };
        if self.store.find_order_by_session(&session.id).await?.is_some() {
            return Ok(Step::Skipped("ordered"));
        }
        match self.store.find_customer(user_id).await? {
            Some(customer) if customer.reminder_opt_in => {}
            _ => return Ok(Step::Skipped("not opted in")),
        }

        let key = recovery_event_key(&session.id);
        if !self.ledger.claim(&key, RECOVERY_EVENT_TYPE).await?.is_claimed() {
            return Ok(Step::Skipped("claimed elsewhere"));
        }

        let resume_url = session.recovery_url.as_deref().unwrap_or(&self.fallback_url);
        match self.mailer.send_recovery_reminder(email, resume_url).await {
            Ok(()) => {
                self.ledger.complete(&key).await?;
                tracing::info!(session_id = %session.id, "Recovery reminder sent");
                Ok(Step::Sent)
            }
            Err(e) => {
                self.ledger.fail(&key, &e.to_string()).await?;
                Ok(Step::Failed)
            }
        }
    }
}
