//! Buyer-facing stock

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use shared::error::AppError;

use super::ApiResult;
use crate::error::ServiceError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub variant_id: String,
    pub available: i64,
}

/// GET /api/variants/{id}/availability
///
/// Only `available` is exposed; on-hand and reserved counts stay internal.
pub async fn availability(
    State(state): State<AppState>,
    Path(variant_id): Path<String>,
) -> ApiResult<Availability> {
    let inventory = state
        .store
        .inventory(&variant_id)
        .await
        .map_err(|e| AppError::from(ServiceError::from(e)))?
        .ok_or_else(|| AppError::not_found(format!("Variant {variant_id}")))?;

    Ok(Json(Availability {
        available: inventory.available(),
        variant_id,
    }))
}
