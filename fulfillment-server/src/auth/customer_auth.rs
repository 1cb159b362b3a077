//! Customer JWT authentication
//!
//! Tokens are issued by the storefront's identity service; this side only
//! verifies them (HS256, shared `JWT_SECRET`).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerClaims {
    /// Customer ID
    pub sub: String,
    pub email: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated customer extracted from the bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerIdentity {
    pub customer_id: String,
    pub email: String,
}

/// Sign a token for a customer (identity service side; used by tests and tooling)
pub fn create_token(
    customer_id: &str,
    email: &str,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = CustomerClaims {
        sub: customer_id.to_string(),
        email: email.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a bearer token
pub fn verify_token(token: &str, secret: &str) -> Result<CustomerIdentity, AppError> {
    let token_data = jsonwebtoken::decode::<CustomerClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::new(ErrorCode::TokenExpired)
            }
            _ => AppError::new(ErrorCode::TokenInvalid),
        }
    })?;

    Ok(CustomerIdentity {
        customer_id: token_data.claims.sub,
        email: token_data.claims.email,
    })
}

/// `None` when no Authorization header is present
fn bearer_identity(request: &Request, secret: &str) -> Result<Option<CustomerIdentity>, AppError> {
    let Some(auth_header) = request.headers().get(http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::with_message(ErrorCode::TokenInvalid, "Invalid Authorization format"))?;
    verify_token(token, secret).map(Some)
}

/// Require a valid customer token
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let identity = bearer_identity(&request, &state.jwt_secret)
        .map_err(IntoResponse::into_response)?
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Accept guests; a present but invalid token is still rejected
pub async fn optional_customer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    if let Some(identity) =
        bearer_identity(&request, &state.jwt_secret).map_err(IntoResponse::into_response)?
    {
        request.extensions_mut().insert(identity);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = create_token("cus_1", "a@example.com", "s3cret", chrono::Duration::hours(1)).unwrap();
        let identity = verify_token(&token, "s3cret").unwrap();
        assert_eq!(identity.customer_id, "cus_1");
        assert_eq!(identity.email, "a@example.com");
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = create_token("cus_1", "a@example.com", "s3cret", chrono::Duration::hours(1)).unwrap();
        assert_eq!(
            verify_token(&token, "other").unwrap_err().code,
            ErrorCode::TokenInvalid
        );
    }

    #[test]
    fn test_expired_token() {
        let token = create_token("cus_1", "a@example.com", "s3cret", chrono::Duration::hours(-2)).unwrap();
        assert_eq!(
            verify_token(&token, "s3cret").unwrap_err().code,
            ErrorCode::TokenExpired
        );
    }
}
