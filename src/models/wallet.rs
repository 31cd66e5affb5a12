//! Wallet models and API request/response types.
//!
//! Amounts are `i64` cents throughout; no floats are ever stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "wallet_txn_type", rename_all = "snake_case")]
pub enum TxnType {
    Credit,
    Debit,
}

/// Where a wallet transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "wallet_txn_source", rename_all = "snake_case")]
pub enum TxnSource {
    /// From a cashback coupon
    Cashback,
    /// From the referral program
    Referral,
    /// Order refund
    Refund,
    /// Promotional credit
    Promo,
    /// Used to pay for an order
    OrderPayment,
    /// Expired credit deduction emitted by the sweeper
    Expired,
    /// Admin manually added
    AdminCredit,
    /// Admin manually deducted
    AdminDebit,
}

impl TxnSource {
    /// Credits from these sources carry an expiry date and count toward the
    /// wallet's expiring balance.
    pub fn is_expiring(self) -> bool {
        matches!(self, TxnSource::Cashback | TxnSource::Referral | TxnSource::Promo)
    }
}

/// A wallet row from the database. Exactly one per customer, created
/// lazily on first access.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub customer_id: Uuid,

    /// Authoritative spendable total; never negative
    pub balance_cents: i64,
    /// Subset of balance that will be force-debited at expiry
    pub expiring_balance_cents: i64,
    /// Lifetime credits, monotonic
    pub total_earned_cents: i64,
    /// Lifetime debits, monotonic
    pub total_spent_cents: i64,

    pub is_frozen: bool,
    pub frozen_reason: Option<String>,
    pub frozen_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Spendable balance as seen by checkout: 0 while frozen.
    pub fn available_balance_cents(&self) -> i64 {
        if self.is_frozen { 0 } else { self.balance_cents }
    }
}

/// An immutable wallet transaction row. Corrections are new offsetting
/// transactions, never edits; only the expiry-sweep bookkeeping columns
/// (`is_expired`, `remaining_expiring_cents`) change after insert.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub customer_id: Uuid,

    pub txn_type: TxnType,
    pub amount_cents: i64,
    pub source: TxnSource,
    pub description: Option<String>,

    pub order_id: Option<Uuid>,
    pub coupon_id: Option<Uuid>,

    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    /// Unspent portion of an expiring credit (FIFO consumption bookkeeping)
    pub remaining_expiring_cents: i64,

    pub created_at: DateTime<Utc>,
}

/// Balance summary returned to clients. A frozen wallet reads as having
/// nothing available, though its ledger totals are still reported.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_cents: i64,
    pub available_balance_cents: i64,
    pub expiring_balance_cents: i64,
    pub total_earned_cents: i64,
    pub total_spent_cents: i64,
    pub is_frozen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_reason: Option<String>,
}

impl From<&Wallet> for BalanceResponse {
    fn from(wallet: &Wallet) -> Self {
        if wallet.is_frozen {
            Self {
                balance_cents: 0,
                available_balance_cents: 0,
                expiring_balance_cents: 0,
                total_earned_cents: wallet.total_earned_cents,
                total_spent_cents: wallet.total_spent_cents,
                is_frozen: true,
                frozen_reason: wallet.frozen_reason.clone(),
            }
        } else {
            Self {
                balance_cents: wallet.balance_cents,
                available_balance_cents: wallet.balance_cents,
                expiring_balance_cents: wallet.expiring_balance_cents,
                total_earned_cents: wallet.total_earned_cents,
                total_spent_cents: wallet.total_spent_cents,
                is_frozen: false,
                frozen_reason: None,
            }
        }
    }
}

/// Request body for crediting a wallet (cashback, referral rewards,
/// promos, refunds). Loyalty and referral collaborators call this surface;
/// they own their own eligibility math.
#[derive(Debug, Deserialize)]
pub struct WalletCreditRequest {
    pub customer_id: Uuid,
    pub amount_cents: i64,
    pub source: TxnSource,
    pub description: Option<String>,
    pub order_id: Option<Uuid>,
    pub coupon_id: Option<Uuid>,
    /// Days until the credit expires; only meaningful for expiring sources
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
}

fn default_expiry_days() -> i64 {
    30
}

/// Request body for debiting a wallet toward an order payment.
#[derive(Debug, Deserialize)]
pub struct WalletDebitRequest {
    pub customer_id: Uuid,
    pub amount_cents: i64,
    pub order_id: Uuid,
    pub description: Option<String>,
}

/// Outcome of a credit.
#[derive(Debug, Serialize)]
pub struct CreditOutcome {
    pub credited_cents: i64,
    pub new_balance_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful debit.
#[derive(Debug, Serialize)]
pub struct DebitOutcome {
    pub deducted_cents: i64,
    pub new_balance_cents: i64,
}

/// What blocks wallet usage at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutBlock {
    WalletFrozen,
    NoBalance,
}

/// Read-only preview of how much of an order the wallet can cover.
#[derive(Debug, Serialize)]
pub struct CheckoutPreview {
    pub can_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckoutBlock>,
    pub available_balance_cents: i64,
    pub usable_amount_cents: i64,
    pub remaining_to_pay_cents: i64,
}

/// Request body for freezing a wallet.
#[derive(Debug, Deserialize)]
pub struct FreezeWalletRequest {
    pub reason: String,
}

/// Credits expiring within a look-ahead window.
#[derive(Debug, Serialize)]
pub struct ExpiringCredits {
    pub expiring_within_days: i64,
    pub total_expiring_cents: i64,
    pub transactions: Vec<WalletTransaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiring_sources_are_cashback_referral_promo() {
        assert!(TxnSource::Cashback.is_expiring());
        assert!(TxnSource::Referral.is_expiring());
        assert!(TxnSource::Promo.is_expiring());

        assert!(!TxnSource::Refund.is_expiring());
        assert!(!TxnSource::OrderPayment.is_expiring());
        assert!(!TxnSource::Expired.is_expiring());
        assert!(!TxnSource::AdminCredit.is_expiring());
        assert!(!TxnSource::AdminDebit.is_expiring());
    }

    #[test]
    fn frozen_wallet_reads_as_empty() {
        let wallet = Wallet {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            balance_cents: 5_000,
            expiring_balance_cents: 2_000,
            total_earned_cents: 9_000,
            total_spent_cents: 4_000,
            is_frozen: true,
            frozen_reason: Some("fraud review".to_string()),
            frozen_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(wallet.available_balance_cents(), 0);

        let response = BalanceResponse::from(&wallet);
        assert_eq!(response.balance_cents, 0);
        assert_eq!(response.available_balance_cents, 0);
        // Lifetime counters stay visible for support staff
        assert_eq!(response.total_earned_cents, 9_000);
        assert_eq!(response.total_spent_cents, 4_000);
    }
}
