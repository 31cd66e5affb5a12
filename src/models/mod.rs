//! Data models and API request/response types.

pub mod cart;
pub mod coupon;
pub mod coupon_usage;
pub mod pagination;
pub mod wallet;
