//! Service-layer error type
//!
//! `ServiceError` bridges storage and provider failures into the API-layer
//! `AppError`, so services can use `?` on both.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::provider::ProviderError;
use crate::store::StoreError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// - `Db`: infrastructure failure (logged, mapped to InternalError)
/// - `App`: business-rule error (passed through to the client)
#[derive(Debug)]
pub enum ServiceError {
    Db(BoxError),
    App(AppError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientInventory { variant_id } => {
                ServiceError::App(AppError::insufficient_inventory(variant_id))
            }
            StoreError::DuplicateOrder { session_id } => ServiceError::App(
                AppError::with_message(
                    ErrorCode::AlreadyExists,
                    format!("Order already exists for session {session_id}"),
                ),
            ),
            other => ServiceError::Db(other.into()),
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(e: ProviderError) -> Self {
        tracing::error!(error = %e, "Payment provider error");
        ServiceError::App(AppError::with_message(
            ErrorCode::PaymentProviderError,
            e.to_string(),
        ))
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e.into())
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Db(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Service infrastructure error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Db(e) => write!(f, "{e}"),
            ServiceError::App(e) => write!(f, "{e}"),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Business error code, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ServiceError::App(e) => Some(e.code),
            ServiceError::Db(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_inventory_becomes_conflict() {
        let err: ServiceError = StoreError::InsufficientInventory {
            variant_id: "var_1".into(),
        }
        .into();
        assert_eq!(err.code(), Some(ErrorCode::InsufficientInventory));

        let app: AppError = err.into();
        assert_eq!(app.http_status(), http::StatusCode::CONFLICT);
    }

    #[test]
    fn test_infrastructure_error_is_internal() {
        let err: ServiceError = StoreError::Corrupt("bad row".into()).into();
        assert_eq!(err.code(), None);
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::InternalError);
    }
}
