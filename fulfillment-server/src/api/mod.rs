//! HTTP API

pub mod checkout;
pub mod cron;
pub mod health;
pub mod inventory;
pub mod stripe_webhook;

use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::error::AppError;
use tower_http::trace::TraceLayer;

use crate::auth::cron_auth::cron_auth_middleware;
use crate::auth::customer_auth::{customer_auth_middleware, optional_customer_auth_middleware};
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Guests may check out; a token links the session to the customer
    let checkout = Router::new()
        .route("/api/checkout", post(checkout::create_checkout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_customer_auth_middleware,
        ));

    let confirm = Router::new()
        .route("/api/checkout/confirm", post(checkout::confirm_checkout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            customer_auth_middleware,
        ));

    let cron = Router::new()
        .route(
            "/api/cron/checkout-recovery",
            get(cron::checkout_recovery),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cron_auth_middleware,
        ));

    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(stripe_webhook::handle_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/variants/{id}/availability",
            get(inventory::availability),
        )
        .merge(checkout)
        .merge(confirm)
        .merge(cron)
        .merge(webhook)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
