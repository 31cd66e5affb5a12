//! Business logic services.
//!
//! Services contain the core promotion and ledger logic separated from the
//! HTTP handlers. `discount` and `coupon_rules` are pure; the rest own the
//! database transactions.

pub mod coupon_rules;
pub mod coupon_service;
pub mod discount;
pub mod expiry_service;
pub mod wallet_service;
