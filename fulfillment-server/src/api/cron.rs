//! Scheduler-triggered jobs

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use shared::error::AppError;
use std::time::Duration;

use super::ApiResult;
use crate::services::RecoveryReport;
use crate::state::AppState;

const MAX_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecoveryQuery {
    pub delay_minutes: Option<u64>,
    pub limit: Option<usize>,
}

/// GET /api/cron/checkout-recovery
pub async fn checkout_recovery(
    State(state): State<AppState>,
    Query(query): Query<RecoveryQuery>,
) -> ApiResult<RecoveryReport> {
    let defaults = &state.recovery_defaults;
    let delay_minutes = query
        .delay_minutes
        .unwrap_or(defaults.delay_minutes.max(0) as u64);
    let limit = query.limit.unwrap_or(defaults.batch_size).clamp(1, MAX_BATCH);

    let report = state
        .recovery
        .run(Duration::from_secs(delay_minutes.saturating_mul(60)), limit)
        .await
        .map_err(AppError::from)?;
    Ok(Json(report))
}
