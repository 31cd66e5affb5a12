//! Expired wallet credit sweeper.
//!
//! Each expiring credit transaction carries an `is_expired` flag and an
//! unspent remainder (`remaining_expiring_cents`). The sweep flips the flag
//! in the same transaction that debits the wallet, so a credit is claimed
//! back exactly once no matter how often or concurrently the sweep runs.

use serde::Serialize;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::wallet::Wallet;

/// Outcome of one sweep pass.
#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub wallets_swept: i64,
    pub credits_expired: i64,
    pub total_expired_cents: i64,
    pub wallets_skipped_frozen: i64,
}

/// Sweep every wallet holding credits whose expiry has passed.
///
/// Per wallet, in one database transaction: lock the wallet row, collect
/// the due credit transactions (`FOR UPDATE`), mark them expired with their
/// remainders zeroed, and emit a single compensating debit for the unspent
/// total, clamped so the balance never goes negative. Frozen wallets are
/// skipped; their credits stay due and are picked up after unfreezing.
///
/// A failure on one wallet is logged and does not stop the pass.
pub async fn sweep_expired_credits(pool: &DbPool) -> Result<SweepSummary, AppError> {
    let wallet_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT wallet_id FROM wallet_transactions
        WHERE txn_type = 'credit'
          AND expires_at IS NOT NULL
          AND NOT is_expired
          AND expires_at <= NOW()
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut summary = SweepSummary::default();

    for wallet_id in wallet_ids {
        match sweep_wallet(pool, wallet_id).await {
            Ok(Some(outcome)) => {
                summary.wallets_swept += 1;
                summary.credits_expired += outcome.credits_expired;
                summary.total_expired_cents += outcome.expired_cents;
            }
            Ok(None) => summary.wallets_skipped_frozen += 1,
            Err(e) => {
                tracing::error!(%wallet_id, error = %e, "failed to sweep wallet, continuing");
            }
        }
    }

    tracing::info!(
        wallets_swept = summary.wallets_swept,
        credits_expired = summary.credits_expired,
        total_expired_cents = summary.total_expired_cents,
        wallets_skipped_frozen = summary.wallets_skipped_frozen,
        "expired credit sweep finished"
    );

    Ok(summary)
}

struct WalletSweepOutcome {
    credits_expired: i64,
    expired_cents: i64,
}

/// Compensating debit for a batch of expired credits: the unspent total,
/// clamped so the balance never goes negative. The remainder bookkeeping
/// should make the clamp a no-op; it is the last line of defense.
fn clamp_expiry_debit(unspent_cents: i64, balance_cents: i64) -> i64 {
    unspent_cents.min(balance_cents).max(0)
}

/// Sweep one wallet. Returns `None` when the wallet is frozen and was left
/// untouched.
async fn sweep_wallet(
    pool: &DbPool,
    wallet_id: Uuid,
) -> Result<Option<WalletSweepOutcome>, AppError> {
    let mut tx = pool.begin().await?;

    let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await?;

    if wallet.is_frozen {
        tx.rollback().await?;
        tracing::warn!(%wallet_id, customer_id = %wallet.customer_id, "skipping frozen wallet in sweep");
        return Ok(None);
    }

    let due = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT id, remaining_expiring_cents
        FROM wallet_transactions
        WHERE wallet_id = $1
          AND txn_type = 'credit'
          AND expires_at IS NOT NULL
          AND NOT is_expired
          AND expires_at <= NOW()
        FOR UPDATE
        "#,
    )
    .bind(wallet_id)
    .fetch_all(&mut *tx)
    .await?;

    if due.is_empty() {
        tx.rollback().await?;
        return Ok(Some(WalletSweepOutcome {
            credits_expired: 0,
            expired_cents: 0,
        }));
    }

    let due_ids: Vec<Uuid> = due.iter().map(|(id, _)| *id).collect();
    let unspent_cents: i64 = due.iter().map(|(_, remaining)| *remaining).sum();

    // The flag is the exactly-once guard: flipped rows never match the due
    // query again
    sqlx::query(
        r#"
        UPDATE wallet_transactions
        SET is_expired = TRUE, remaining_expiring_cents = 0
        WHERE id = ANY($1)
        "#,
    )
    .bind(&due_ids)
    .execute(&mut *tx)
    .await?;

    let expired_cents = clamp_expiry_debit(unspent_cents, wallet.balance_cents);

    if expired_cents > 0 {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                wallet_id, customer_id, txn_type, amount_cents, source, description
            )
            VALUES ($1, $2, 'debit', $3, 'expired', 'Expired wallet credit')
            "#,
        )
        .bind(wallet_id)
        .bind(wallet.customer_id)
        .bind(expired_cents)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents - $1,
            total_spent_cents = total_spent_cents + $1,
            expiring_balance_cents = GREATEST(expiring_balance_cents - $2, 0),
            updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(expired_cents)
    .bind(unspent_cents)
    .bind(wallet_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        %wallet_id,
        customer_id = %wallet.customer_id,
        credits_expired = due_ids.len(),
        expired_cents,
        "swept expired credits"
    );

    Ok(Some(WalletSweepOutcome {
        credits_expired: due_ids.len() as i64,
        expired_cents,
    }))
}
