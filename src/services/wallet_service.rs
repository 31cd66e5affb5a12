//! Wallet ledger service.
//!
//! All balance mutations run inside a database transaction with the wallet
//! row locked (`FOR UPDATE`) and a conditional balance update - never a
//! read-modify-write across round trips. The transaction log is
//! append-only: corrections are offsetting entries, not edits.
//!
//! # Expiring credits
//!
//! Credits from cashback/referral/promo sources carry an expiry date and a
//! `remaining_expiring_cents` remainder. Debits consume those remainders
//! oldest-expiry-first (FIFO), so `expiring_balance_cents` always reflects
//! what will actually be lost at expiry and the sweeper debits exactly the
//! unspent portion.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::pagination::{Paginated, Pagination};
use crate::models::wallet::{
    BalanceResponse, CheckoutBlock, CheckoutPreview, CreditOutcome, DebitOutcome, ExpiringCredits,
    TxnSource, Wallet, WalletTransaction,
};

/// Fetch a customer's wallet, creating it lazily with zeroed balances.
pub async fn get_or_create(pool: &DbPool, customer_id: Uuid) -> Result<Wallet, AppError> {
    sqlx::query("INSERT INTO wallets (customer_id) VALUES ($1) ON CONFLICT (customer_id) DO NOTHING")
        .bind(customer_id)
        .execute(pool)
        .await?;

    let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(pool)
        .await?;

    Ok(wallet)
}

/// Balance summary for a customer. Frozen wallets read as empty.
pub async fn get_balance(pool: &DbPool, customer_id: Uuid) -> Result<BalanceResponse, AppError> {
    let wallet = get_or_create(pool, customer_id).await?;
    Ok(BalanceResponse::from(&wallet))
}

/// Expiry date a credit gets, if its source is an expiring one.
fn credit_expiry(source: TxnSource, expiry_days: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    source.is_expiring().then(|| now + Duration::days(expiry_days))
}

fn validate_credit_request(amount_cents: i64, expiry_days: i64) -> Result<(), AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "Credit amount must be positive".to_string(),
        ));
    }
    // A negative expiry would mint a credit that is already due and gets
    // clawed back by the next sweep
    if expiry_days < 0 {
        return Err(AppError::InvalidRequest(
            "expiry_days cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Plan how a debit draws down expiring-credit remainders, oldest expiry
/// first. Returns the per-row draws and the total covered by expiring
/// credits; the rest of the debit comes out of non-expiring balance.
fn plan_expiring_draws(remainders: &[(Uuid, i64)], amount_cents: i64) -> (Vec<(Uuid, i64)>, i64) {
    let mut left = amount_cents;
    let mut draws = Vec::new();

    for &(txn_id, remaining) in remainders {
        if left == 0 {
            break;
        }
        let draw = left.min(remaining);
        if draw > 0 {
            draws.push((txn_id, draw));
            left -= draw;
        }
    }

    (draws, amount_cents - left)
}

/// Credit a wallet.
///
/// Credits are accepted even on frozen wallets - the money is recorded but
/// not spendable until the wallet is unfrozen. Expiring sources
/// (cashback/referral/promo) raise `expiring_balance_cents` and stamp the
/// transaction with `expires_at = now + expiry_days`.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `Database`: storage failure
pub async fn credit(
    pool: &DbPool,
    customer_id: Uuid,
    amount_cents: i64,
    source: TxnSource,
    description: Option<String>,
    order_id: Option<Uuid>,
    coupon_id: Option<Uuid>,
    expiry_days: i64,
) -> Result<CreditOutcome, AppError> {
    validate_credit_request(amount_cents, expiry_days)?;

    let wallet = get_or_create(pool, customer_id).await?;
    let expires_at = credit_expiry(source, expiry_days, Utc::now());
    let expiring_delta = if expires_at.is_some() { amount_cents } else { 0 };

    let mut tx = pool.begin().await?;

    // Lock the wallet row for the duration of the balance update
    sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
        .bind(wallet.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            wallet_id, customer_id, txn_type, amount_cents, source,
            description, order_id, coupon_id, expires_at, remaining_expiring_cents
        )
        VALUES ($1, $2, 'credit', $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(wallet.id)
    .bind(customer_id)
    .bind(amount_cents)
    .bind(source)
    .bind(&description)
    .bind(order_id)
    .bind(coupon_id)
    .bind(expires_at)
    .bind(expiring_delta)
    .execute(&mut *tx)
    .await?;

    let new_balance_cents: i64 = sqlx::query_scalar(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents + $1,
            total_earned_cents = total_earned_cents + $1,
            expiring_balance_cents = expiring_balance_cents + $2,
            updated_at = NOW()
        WHERE id = $3
        RETURNING balance_cents
        "#,
    )
    .bind(amount_cents)
    .bind(expiring_delta)
    .bind(wallet.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        %customer_id,
        amount_cents,
        source = ?source,
        "wallet credited"
    );

    Ok(CreditOutcome {
        credited_cents: amount_cents,
        new_balance_cents,
        expires_at,
    })
}

/// Debit a wallet.
///
/// Runs as one database transaction: wallet row locked, balance decrement
/// conditional on `balance_cents >= amount`, expiring credits consumed
/// FIFO by expiry date, debit entry appended.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `WalletFrozen`: wallet is frozen; no debit happens
/// - `InsufficientBalance`: balance cannot cover the amount (reports what
///   is available); balance is left untouched
pub async fn debit(
    pool: &DbPool,
    customer_id: Uuid,
    amount_cents: i64,
    source: TxnSource,
    order_id: Option<Uuid>,
    description: Option<String>,
) -> Result<DebitOutcome, AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "Debit amount must be positive".to_string(),
        ));
    }

    // Ensure the wallet exists before locking it
    get_or_create(pool, customer_id).await?;

    let mut tx = pool.begin().await?;

    let wallet =
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE customer_id = $1 FOR UPDATE")
            .bind(customer_id)
            .fetch_one(&mut *tx)
            .await?;

    if wallet.is_frozen {
        tx.rollback().await?;
        return Err(AppError::WalletFrozen);
    }

    if wallet.balance_cents < amount_cents {
        tx.rollback().await?;
        return Err(AppError::InsufficientBalance {
            available_cents: wallet.balance_cents,
        });
    }

    // Consume expiring credits soonest-expiry-first
    let consumed_expiring = consume_expiring_credits(&mut tx, wallet.id, amount_cents).await?;

    // Conditional decrement: the WHERE clause re-checks the balance so a
    // concurrent spend cannot drive it negative
    let updated = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents - $1,
            total_spent_cents = total_spent_cents + $1,
            expiring_balance_cents = GREATEST(expiring_balance_cents - $2, 0),
            updated_at = NOW()
        WHERE id = $3 AND balance_cents >= $1
        RETURNING balance_cents
        "#,
    )
    .bind(amount_cents)
    .bind(consumed_expiring)
    .bind(wallet.id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(new_balance_cents) = updated else {
        tx.rollback().await?;
        return Err(AppError::InsufficientBalance {
            available_cents: wallet.balance_cents,
        });
    };

    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            wallet_id, customer_id, txn_type, amount_cents, source, description, order_id
        )
        VALUES ($1, $2, 'debit', $3, $4, $5, $6)
        "#,
    )
    .bind(wallet.id)
    .bind(customer_id)
    .bind(amount_cents)
    .bind(source)
    .bind(&description)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%customer_id, amount_cents, source = ?source, "wallet debited");

    Ok(DebitOutcome {
        deducted_cents: amount_cents,
        new_balance_cents,
    })
}

/// Draw down expiring-credit remainders oldest-expiry-first, returning how
/// much of the debit was covered by expiring credits.
async fn consume_expiring_credits(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    wallet_id: Uuid,
    amount_cents: i64,
) -> Result<i64, AppError> {
    let credits = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT id, remaining_expiring_cents
        FROM wallet_transactions
        WHERE wallet_id = $1
          AND txn_type = 'credit'
          AND expires_at IS NOT NULL
          AND NOT is_expired
          AND remaining_expiring_cents > 0
        ORDER BY expires_at ASC
        FOR UPDATE
        "#,
    )
    .bind(wallet_id)
    .fetch_all(&mut **tx)
    .await?;

    let (draws, consumed) = plan_expiring_draws(&credits, amount_cents);

    for (txn_id, draw) in draws {
        sqlx::query(
            "UPDATE wallet_transactions SET remaining_expiring_cents = remaining_expiring_cents - $1 WHERE id = $2",
        )
        .bind(draw)
        .bind(txn_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(consumed)
}

/// Read-only preview of how much of `amount_cents` the wallet can cover.
/// Never mutates state.
pub async fn validate_for_checkout(
    pool: &DbPool,
    customer_id: Uuid,
    amount_cents: i64,
) -> Result<CheckoutPreview, AppError> {
    let wallet = get_or_create(pool, customer_id).await?;

    if wallet.is_frozen {
        return Ok(CheckoutPreview {
            can_use: false,
            error: Some(CheckoutBlock::WalletFrozen),
            available_balance_cents: 0,
            usable_amount_cents: 0,
            remaining_to_pay_cents: amount_cents,
        });
    }

    if wallet.balance_cents <= 0 {
        return Ok(CheckoutPreview {
            can_use: false,
            error: Some(CheckoutBlock::NoBalance),
            available_balance_cents: 0,
            usable_amount_cents: 0,
            remaining_to_pay_cents: amount_cents,
        });
    }

    let usable_amount_cents = wallet.balance_cents.min(amount_cents);

    Ok(CheckoutPreview {
        can_use: true,
        error: None,
        available_balance_cents: wallet.balance_cents,
        usable_amount_cents,
        remaining_to_pay_cents: amount_cents - usable_amount_cents,
    })
}

/// Freeze a wallet. Frozen wallets reject all debits; credits are still
/// recorded.
pub async fn freeze(pool: &DbPool, customer_id: Uuid, reason: &str) -> Result<Wallet, AppError> {
    get_or_create(pool, customer_id).await?;

    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET is_frozen = TRUE, frozen_reason = $2, frozen_at = NOW(), updated_at = NOW()
        WHERE customer_id = $1
        RETURNING *
        "#,
    )
    .bind(customer_id)
    .bind(reason)
    .fetch_one(pool)
    .await?;

    tracing::warn!(%customer_id, reason, "wallet frozen");
    Ok(wallet)
}

/// Unfreeze a wallet, making its balance spendable again.
pub async fn unfreeze(pool: &DbPool, customer_id: Uuid) -> Result<Wallet, AppError> {
    get_or_create(pool, customer_id).await?;

    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET is_frozen = FALSE, frozen_reason = NULL, frozen_at = NULL, updated_at = NOW()
        WHERE customer_id = $1
        RETURNING *
        "#,
    )
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(%customer_id, "wallet unfrozen");
    Ok(wallet)
}

/// Paginated transaction history, newest first.
pub async fn get_transactions(
    pool: &DbPool,
    customer_id: Uuid,
    pagination: &Pagination,
) -> Result<Paginated<WalletTransaction>, AppError> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(pool)
            .await?;

    let transactions = sqlx::query_as::<_, WalletTransaction>(
        r#"
        SELECT * FROM wallet_transactions
        WHERE customer_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(customer_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(transactions, pagination, total))
}

/// Credits expiring within the next `days` days, with the total still at
/// stake (the unspent remainders, not the original credit amounts).
pub async fn get_expiring_credits(
    pool: &DbPool,
    customer_id: Uuid,
    days: i64,
) -> Result<ExpiringCredits, AppError> {
    let threshold = Utc::now() + Duration::days(days);

    let transactions = sqlx::query_as::<_, WalletTransaction>(
        r#"
        SELECT * FROM wallet_transactions
        WHERE customer_id = $1
          AND txn_type = 'credit'
          AND NOT is_expired
          AND remaining_expiring_cents > 0
          AND expires_at > NOW()
          AND expires_at <= $2
        ORDER BY expires_at ASC
        "#,
    )
    .bind(customer_id)
    .bind(threshold)
    .fetch_all(pool)
    .await?;

    let total_expiring_cents = transactions
        .iter()
        .map(|t| t.remaining_expiring_cents)
        .sum();

    Ok(ExpiringCredits {
        expiring_within_days: days,
        total_expiring_cents,
        transactions,
    })
}

/// Refund an order amount back to the wallet. Refund credits never expire.
pub async fn process_refund(
    pool: &DbPool,
    customer_id: Uuid,
    amount_cents: i64,
    order_id: Uuid,
    reason: &str,
) -> Result<CreditOutcome, AppError> {
    credit(
        pool,
        customer_id,
        amount_cents,
        TxnSource::Refund,
        Some(format!("Refund: {}", reason)),
        Some(order_id),
        None,
        0,
    )
    .await
}

/// Persist a reconciliation-gap record for a wallet adjustment that could
/// not be completed. These rows are liabilities awaiting manual review;
/// writing one must never fail the surrounding flow, so callers log and
/// continue if this errors.
pub async fn record_pending_reversal(
    pool: &DbPool,
    customer_id: Uuid,
    order_id: Uuid,
    amount_cents: i64,
    reason: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO wallet_pending_reversals (customer_id, order_id, amount_cents, reason)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(customer_id)
    .bind(order_id)
    .bind(amount_cents)
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiring_sources_get_an_expiry_date() {
        let now = Utc::now();

        let expiry = credit_expiry(TxnSource::Cashback, 30, now);
        assert_eq!(expiry, Some(now + Duration::days(30)));

        let expiry = credit_expiry(TxnSource::Promo, 7, now);
        assert_eq!(expiry, Some(now + Duration::days(7)));
    }

    #[test]
    fn refund_credits_never_expire() {
        let now = Utc::now();
        assert_eq!(credit_expiry(TxnSource::Refund, 0, now), None);
        assert_eq!(credit_expiry(TxnSource::Refund, 30, now), None);
        assert_eq!(credit_expiry(TxnSource::AdminCredit, 30, now), None);
    }

    #[test]
    fn credit_rejects_non_positive_amounts_and_negative_expiry() {
        assert!(validate_credit_request(0, 30).is_err());
        assert!(validate_credit_request(-100, 30).is_err());
        assert!(validate_credit_request(100, -1).is_err());

        assert!(validate_credit_request(100, 0).is_ok());
        assert!(validate_credit_request(100, 30).is_ok());
    }

    #[test]
    fn draws_consume_oldest_remainders_first() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let remainders = vec![(a, 1_000), (b, 2_000)];

        // 25.00 drains the oldest credit and takes half the next
        let (draws, consumed) = plan_expiring_draws(&remainders, 2_500);
        assert_eq!(draws, vec![(a, 1_000), (b, 1_500)]);
        assert_eq!(consumed, 2_500);
    }

    #[test]
    fn draw_stops_once_the_debit_is_covered() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (draws, consumed) = plan_expiring_draws(&[(a, 1_000), (b, 2_000)], 700);
        assert_eq!(draws, vec![(a, 700)]);
        assert_eq!(consumed, 700);
    }

    #[test]
    fn draw_is_capped_by_the_available_remainders() {
        let a = Uuid::new_v4();
        // Debit larger than all expiring credit: the rest comes out of
        // non-expiring balance
        let (draws, consumed) = plan_expiring_draws(&[(a, 1_000)], 5_000);
        assert_eq!(draws, vec![(a, 1_000)]);
        assert_eq!(consumed, 1_000);
    }

    #[test]
    fn drained_remainders_draw_nothing() {
        let (draws, consumed) = plan_expiring_draws(&[], 5_000);
        assert!(draws.is_empty());
        assert_eq!(consumed, 0);

        // Rows already consumed to zero contribute nothing
        let (draws, consumed) = plan_expiring_draws(&[(Uuid::new_v4(), 0)], 5_000);
        assert!(draws.is_empty());
        assert_eq!(consumed, 0);
    }
}
