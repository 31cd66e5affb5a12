//! Error types and HTTP error response handling.
//!
//! Coupon validation rejections are **not** represented here: they are
//! ordinary return values (`ValidationResult`) so callers can render a
//! specific user message. `AppError` covers storage failures and the
//! recoverable wallet/usage outcomes that map onto HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Resource Errors**: Coupon / usage rows that do not exist
/// - **Business Outcomes**: Frozen wallets, insufficient balance, exhausted
///   usage limits - recoverable conditions the caller is expected to handle
/// - **Validation Errors**: Invalid request data (bad amounts, bad coupon
///   definitions)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No coupon exists for the given code.
    #[error("Coupon not found")]
    CouponNotFound,

    /// No coupon usage record exists for the given order.
    #[error("Coupon usage not found")]
    UsageNotFound,

    /// The coupon's global usage limit is exhausted; the conditional
    /// increment claimed zero rows.
    #[error("Coupon usage limit exhausted")]
    CouponLimitExhausted,

    /// Wallet is frozen; all debits are rejected until it is unfrozen.
    #[error("Wallet is frozen")]
    WalletFrozen,

    /// Wallet balance cannot cover the requested debit.
    ///
    /// Carries the spendable balance so the caller can tell the customer
    /// how much is actually available.
    #[error("Insufficient wallet balance: {available_cents} available")]
    InsufficientBalance { available_cents: i64 },

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "ERROR_CODE",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `CouponNotFound` / `UsageNotFound` → 404 Not Found
/// - `CouponLimitExhausted` / `WalletFrozen` / `InsufficientBalance` → 422 Unprocessable Entity
/// - `InvalidRequest` → 400 Bad Request
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::CouponNotFound => {
                (StatusCode::NOT_FOUND, "COUPON_NOT_FOUND", self.to_string())
            }
            AppError::UsageNotFound => {
                (StatusCode::NOT_FOUND, "USAGE_NOT_FOUND", self.to_string())
            }
            AppError::CouponLimitExhausted => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "LIMIT_EXHAUSTED",
                self.to_string(),
            ),
            AppError::WalletFrozen => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "WALLET_FROZEN",
                self.to_string(),
            ),
            AppError::InsufficientBalance { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_BALANCE",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
