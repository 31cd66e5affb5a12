//! Promotions and wallet ledger engine for a grocery-delivery marketplace.
//!
//! The crate is consumed two ways: as a library exposing the coupon and
//! wallet services (the contract used by the order/checkout, loyalty and
//! referral collaborators), and as a thin HTTP binary wiring those services
//! to routes.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod tasks;

pub use config::Config;
pub use db::DbPool;
pub use error::AppError;
