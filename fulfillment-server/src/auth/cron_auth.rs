//! Shared-secret guard for scheduler-triggered endpoints

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

/// Secret from `Authorization: Bearer <secret>` or `x-cron-secret`
fn presented_secret(request: &Request) -> Option<&str> {
    let headers = request.headers();
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-cron-secret").and_then(|v| v.to_str().ok()))
}

/// Constant-time comparison via HMAC tags keyed by each secret
pub(crate) fn secret_matches(presented: &str, expected: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(b"cron");
    let expected_tag = mac.finalize().into_bytes();

    let Ok(mut check) = Hmac::<Sha256>::new_from_slice(presented.as_bytes()) else {
        return false;
    };
    check.update(b"cron");
    check.verify_slice(&expected_tag).is_ok()
}

pub async fn cron_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if state.cron_secret.is_empty() {
        return Err(AppError::config("CRON_SECRET is not configured").into_response());
    }
    let authorized = matches!(
        presented_secret(&request),
        Some(secret) if secret_matches(secret, &state.cron_secret)
    );
    if !authorized {
        tracing::warn!("Cron request rejected: bad secret");
        return Err(AppError::new(ErrorCode::CronSecretInvalid).into_response());
    }
    Ok(next.run(request).await)
}
