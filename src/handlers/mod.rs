//! HTTP request handlers (route handlers).
//!
//! Each handler is a thin async function: extract the request, call the
//! matching service, serialize the result. No business logic lives here.

/// Coupon catalog and redemption endpoints
pub mod coupons;
/// Service health endpoint
pub mod health;
/// Wallet ledger endpoints
pub mod wallet;
