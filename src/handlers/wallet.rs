//! Wallet HTTP handlers.
//!
//! - `GET /api/v1/customers/{id}/wallet` - balance summary
//! - `POST /api/v1/wallet/credit` - credit (loyalty/referral collaborators)
//! - `POST /api/v1/wallet/debit` - debit toward an order payment
//! - `POST /api/v1/wallet/refund` - non-expiring refund credit
//! - `GET /api/v1/customers/{id}/wallet/checkout-preview` - usable amount
//! - `GET /api/v1/customers/{id}/wallet/transactions` - ledger history
//! - `GET /api/v1/customers/{id}/wallet/expiring` - credits about to expire
//! - `POST /api/v1/customers/{id}/wallet/freeze` / `/unfreeze` - admin

use crate::{
    db::DbPool,
    error::AppError,
    models::pagination::{Paginated, Pagination},
    models::wallet::{
        BalanceResponse, CheckoutPreview, CreditOutcome, DebitOutcome, ExpiringCredits,
        FreezeWalletRequest, TxnSource, Wallet, WalletCreditRequest, WalletDebitRequest,
        WalletTransaction,
    },
    services::wallet_service,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

/// Balance summary. A frozen wallet reads as having nothing available.
pub async fn get_balance(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = wallet_service::get_balance(&pool, customer_id).await?;
    Ok(Json(balance))
}

/// Credit a wallet. The contract consumed by the loyalty and referral
/// collaborators; they own eligibility, this endpoint owns the ledger.
///
/// # Request body
///
/// ```json
/// {
///   "customer_id": "550e8400-...",
///   "amount_cents": 2500,
///   "source": "referral",
///   "description": "Referral reward",
///   "expiry_days": 30
/// }
/// ```
pub async fn credit_wallet(
    State(pool): State<DbPool>,
    Json(request): Json<WalletCreditRequest>,
) -> Result<Json<CreditOutcome>, AppError> {
    let outcome = wallet_service::credit(
        &pool,
        request.customer_id,
        request.amount_cents,
        request.source,
        request.description,
        request.order_id,
        request.coupon_id,
        request.expiry_days,
    )
    .await?;
    Ok(Json(outcome))
}

/// Debit a wallet toward an order payment.
///
/// # Errors
///
/// - 422 `WALLET_FROZEN` when the wallet is frozen
/// - 422 `INSUFFICIENT_BALANCE` (with the available amount) when short
pub async fn debit_wallet(
    State(pool): State<DbPool>,
    Json(request): Json<WalletDebitRequest>,
) -> Result<Json<DebitOutcome>, AppError> {
    let outcome = wallet_service::debit(
        &pool,
        request.customer_id,
        request.amount_cents,
        TxnSource::OrderPayment,
        Some(request.order_id),
        request.description,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct WalletRefundRequest {
    pub customer_id: Uuid,
    pub amount_cents: i64,
    pub order_id: Uuid,
    pub reason: String,
}

/// Refund an order amount back to the wallet. The resulting credit never
/// expires.
pub async fn refund_to_wallet(
    State(pool): State<DbPool>,
    Json(request): Json<WalletRefundRequest>,
) -> Result<Json<CreditOutcome>, AppError> {
    let outcome = wallet_service::process_refund(
        &pool,
        request.customer_id,
        request.amount_cents,
        request.order_id,
        &request.reason,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutPreviewQuery {
    pub amount_cents: i64,
}

/// Read-only preview of how much of an order total the wallet can cover.
pub async fn checkout_preview(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<CheckoutPreviewQuery>,
) -> Result<Json<CheckoutPreview>, AppError> {
    let preview =
        wallet_service::validate_for_checkout(&pool, customer_id, query.amount_cents).await?;
    Ok(Json(preview))
}

/// Paginated transaction history, newest first.
pub async fn wallet_transactions(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<WalletTransaction>>, AppError> {
    let transactions = wallet_service::get_transactions(&pool, customer_id, &pagination).await?;
    Ok(Json(transactions))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringCreditsQuery {
    #[serde(default = "default_expiring_days")]
    pub days: i64,
}

fn default_expiring_days() -> i64 {
    7
}

/// Credits expiring within the next `days` days (default 7).
pub async fn expiring_credits(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<ExpiringCreditsQuery>,
) -> Result<Json<ExpiringCredits>, AppError> {
    let expiring = wallet_service::get_expiring_credits(&pool, customer_id, query.days).await?;
    Ok(Json(expiring))
}

/// Freeze a wallet (admin). Blocks debits; credits still land.
pub async fn freeze_wallet(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<FreezeWalletRequest>,
) -> Result<Json<Wallet>, AppError> {
    let wallet = wallet_service::freeze(&pool, customer_id, &request.reason).await?;
    Ok(Json(wallet))
}

/// Unfreeze a wallet (admin).
pub async fn unfreeze_wallet(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Wallet>, AppError> {
    let wallet = wallet_service::unfreeze(&pool, customer_id).await?;
    Ok(Json(wallet))
}
