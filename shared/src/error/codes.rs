//! Unified error codes for the fulfillment service
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Checkout errors
//! - 4xxx: Order errors
//! - 5xxx: Payment provider errors
//! - 6xxx: Inventory errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so the storefront client
/// can branch on them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,
    /// Cron shared secret missing or wrong
    CronSecretInvalid = 1005,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,

    // ==================== 3xxx: Checkout ====================
    /// Cart has no lines
    CartEmpty = 3001,
    /// Line quantity is zero or negative
    InvalidQuantity = 3002,
    /// Subtotal is below the minimum order value
    BelowMinimumOrder = 3003,
    /// Promotion code not found or inactive
    InvalidDiscount = 3004,
    /// Cart references an unknown or inactive variant
    VariantNotFound = 3005,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Payment session not found at the provider
    SessionNotFound = 4002,
    /// Session carries no buyer back-reference
    MissingBuyerReference = 4003,
    /// Session has not completed yet
    SessionNotComplete = 4004,

    // ==================== 5xxx: Payment ====================
    /// Payment provider returned an error
    PaymentProviderError = 5001,
    /// Payment provider could not open a checkout session
    ProviderSessionCreateFailed = 5002,
    /// Webhook signature verification failed
    SignatureInvalid = 5003,

    // ==================== 6xxx: Inventory ====================
    /// Not enough available stock for a variant
    InsufficientInventory = 6001,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
    /// Network error
    NetworkError = 9004,
    /// Timeout error
    TimeoutError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidFormat => "Invalid format",
            Self::RequiredField => "Required field missing",

            // Auth
            Self::NotAuthenticated => "Authentication required",
            Self::TokenExpired => "Token has expired",
            Self::TokenInvalid => "Invalid token",
            Self::CronSecretInvalid => "Invalid cron secret",

            // Permission
            Self::PermissionDenied => "Permission denied",

            // Checkout
            Self::CartEmpty => "Cart is empty",
            Self::InvalidQuantity => "Quantity must be at least 1",
            Self::BelowMinimumOrder => "Order is below the minimum order value",
            Self::InvalidDiscount => "Discount code is invalid or inactive",
            Self::VariantNotFound => "Product variant not found",

            // Order
            Self::OrderNotFound => "Order not found",
            Self::SessionNotFound => "Checkout session not found",
            Self::MissingBuyerReference => "Checkout session is not linked to a buyer",
            Self::SessionNotComplete => "Checkout session is not complete",

            // Payment
            Self::PaymentProviderError => "Payment provider error",
            Self::ProviderSessionCreateFailed => "Could not start checkout with payment provider",
            Self::SignatureInvalid => "Invalid webhook signature",

            // Inventory
            Self::InsufficientInventory => "Not enough stock",

            // System
            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
            Self::ConfigError => "Configuration error",
            Self::NetworkError => "Network error",
            Self::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when converting an unknown u16 into [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::AlreadyExists),
            5 => Ok(Self::InvalidRequest),
            6 => Ok(Self::InvalidFormat),
            7 => Ok(Self::RequiredField),

            1001 => Ok(Self::NotAuthenticated),
            1003 => Ok(Self::TokenExpired),
            1004 => Ok(Self::TokenInvalid),
            1005 => Ok(Self::CronSecretInvalid),

            2001 => Ok(Self::PermissionDenied),

            3001 => Ok(Self::CartEmpty),
            3002 => Ok(Self::InvalidQuantity),
            3003 => Ok(Self::BelowMinimumOrder),
            3004 => Ok(Self::InvalidDiscount),
            3005 => Ok(Self::VariantNotFound),

            4001 => Ok(Self::OrderNotFound),
            4002 => Ok(Self::SessionNotFound),
            4003 => Ok(Self::MissingBuyerReference),
            4004 => Ok(Self::SessionNotComplete),

            5001 => Ok(Self::PaymentProviderError),
            5002 => Ok(Self::ProviderSessionCreateFailed),
            5003 => Ok(Self::SignatureInvalid),

            6001 => Ok(Self::InsufficientInventory),

            9001 => Ok(Self::InternalError),
            9002 => Ok(Self::DatabaseError),
            9003 => Ok(Self::ConfigError),
            9004 => Ok(Self::NetworkError),
            9005 => Ok(Self::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::CartEmpty.code(), 3001);
        assert_eq!(ErrorCode::SessionNotFound.code(), 4002);
        assert_eq!(ErrorCode::SignatureInvalid.code(), 5003);
        assert_eq!(ErrorCode::InsufficientInventory.code(), 6001);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_try_from_valid() {
        assert_eq!(ErrorCode::try_from(6001), Ok(ErrorCode::InsufficientInventory));
        assert_eq!(ErrorCode::try_from(3004), Ok(ErrorCode::InvalidDiscount));
        assert_eq!(ErrorCode::try_from(0), Ok(ErrorCode::Success));
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(4242), Err(InvalidErrorCode(4242)));
        assert_eq!(InvalidErrorCode(4242).to_string(), "invalid error code: 4242");
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::InsufficientInventory).unwrap();
        assert_eq!(json, "6001");

        let code: ErrorCode = serde_json::from_str("3003").unwrap();
        assert_eq!(code, ErrorCode::BelowMinimumOrder);

        assert!(serde_json::from_str::<ErrorCode>("12").is_err());
    }

    #[test]
    fn test_message() {
        assert_eq!(ErrorCode::CartEmpty.message(), "Cart is empty");
        assert_eq!(ErrorCode::InsufficientInventory.message(), "Not enough stock");
    }
}
