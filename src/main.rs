//! Promotions & Wallet Ledger - Main Application Entry Point
//!
//! REST API for the grocery marketplace promotions stack: coupon catalog,
//! validation and redemption ledger, and the customer wallet (cashback,
//! referral and promo credits with expiry).
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Spawn the expired-credit sweeper
//! 5. Build HTTP router and serve

use tracing_subscriber::EnvFilter;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use promo_ledger::{config, db, handlers, tasks};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    tasks::spawn_expiry_sweeper(pool.clone(), config.sweep_interval_secs);

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        // Coupon catalog (operator + customer surfaces)
        .route("/api/v1/coupons", post(handlers::coupons::create_coupon))
        .route(
            "/api/v1/coupons/available",
            get(handlers::coupons::available_coupons),
        )
        // Order collaborator surface
        .route(
            "/api/v1/coupons/validate",
            post(handlers::coupons::validate_coupon),
        )
        .route("/api/v1/coupons/apply", post(handlers::coupons::apply_coupon))
        .route(
            "/api/v1/coupons/complete/{order_id}",
            post(handlers::coupons::complete_coupon),
        )
        .route(
            "/api/v1/coupons/cancel/{order_id}",
            post(handlers::coupons::cancel_coupon),
        )
        .route(
            "/api/v1/coupons/refund",
            post(handlers::coupons::refund_coupon),
        )
        .route(
            "/api/v1/customers/{customer_id}/coupon-history",
            get(handlers::coupons::coupon_history),
        )
        // Wallet ledger
        .route(
            "/api/v1/customers/{customer_id}/wallet",
            get(handlers::wallet::get_balance),
        )
        .route("/api/v1/wallet/credit", post(handlers::wallet::credit_wallet))
        .route("/api/v1/wallet/debit", post(handlers::wallet::debit_wallet))
        .route("/api/v1/wallet/refund", post(handlers::wallet::refund_to_wallet))
        .route(
            "/api/v1/customers/{customer_id}/wallet/checkout-preview",
            get(handlers::wallet::checkout_preview),
        )
        .route(
            "/api/v1/customers/{customer_id}/wallet/transactions",
            get(handlers::wallet::wallet_transactions),
        )
        .route(
            "/api/v1/customers/{customer_id}/wallet/expiring",
            get(handlers::wallet::expiring_credits),
        )
        .route(
            "/api/v1/customers/{customer_id}/wallet/freeze",
            post(handlers::wallet::freeze_wallet),
        )
        .route(
            "/api/v1/customers/{customer_id}/wallet/unfreeze",
            post(handlers::wallet::unfreeze_wallet),
        )
        // Distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .with_state(pool);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
