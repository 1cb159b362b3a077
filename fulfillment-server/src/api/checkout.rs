//! Checkout initiation and confirmation

use axum::extract::State;
use axum::{Extension, Json};
use shared::cart::{CheckoutRequest, CheckoutResponse, ConfirmRequest};
use shared::error::AppError;
use shared::order::Order;

use super::ApiResult;
use crate::auth::CustomerIdentity;
use crate::services::checkout::Buyer;
use crate::state::AppState;

/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    identity: Option<Extension<CustomerIdentity>>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    let buyer = match identity {
        Some(Extension(identity)) => Buyer {
            user_id: Some(identity.customer_id),
            email: Some(identity.email),
        },
        None => Buyer::default(),
    };

    let response = state
        .checkout
        .initiate(&req, &buyer)
        .await
        .map_err(AppError::from)?;
    Ok(Json(response))
}

/// POST /api/checkout/confirm
///
/// Materializes the order for a completed session owned by the caller.
/// Safe to call after (or racing) the webhook.
pub async fn confirm_checkout(
    State(state): State<AppState>,
    Extension(identity): Extension<CustomerIdentity>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Order> {
    if req.session_id.trim().is_empty() {
        return Err(AppError::validation("sessionId is required"));
    }

    let materialized = state
        .materializer
        .materialize(&req.session_id, Some(&identity.customer_id))
        .await
        .map_err(AppError::from)?;
    Ok(Json(materialized.into_order()))
}
