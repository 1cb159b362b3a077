//! Stripe webhook handler
//!
//! POST /stripe/webhook: raw body, verified before parsing.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::provider::signature::verify_webhook_signature;
use crate::services::webhook::WebhookOutcome;
use crate::state::AppState;

/// Handle incoming Stripe webhook events
///
/// 4xx means the delivery itself is bad; 5xx asks the provider to retry.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if state.stripe_webhook_secret.is_empty() {
        tracing::error!("STRIPE_WEBHOOK_SECRET not configured, rejecting webhook");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing Stripe-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) = verify_webhook_signature(
        &body,
        sig_header,
        &state.stripe_webhook_secret,
        state.webhook_tolerance_secs,
        shared::util::now_secs(),
    ) {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event_type = event["type"].as_str().unwrap_or("");
    tracing::info!(event_type = event_type, "Received Stripe webhook");

    match state.webhooks.process(&event).await {
        Ok(WebhookOutcome::Handled | WebhookOutcome::Ignored | WebhookOutcome::Duplicate) => {
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(event_type = event_type, error = %e, "Webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
