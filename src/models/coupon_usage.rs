//! Coupon usage ledger models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartItem;
use super::coupon::CouponType;

/// Lifecycle of a redemption. One-way: `applied` may move to `completed`,
/// `refunded` or `cancelled`; all three are terminal except that a
/// completed usage can still be refunded when the order is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "usage_status", rename_all = "snake_case")]
pub enum UsageStatus {
    Applied,
    Completed,
    Refunded,
    Cancelled,
}

impl UsageStatus {
    /// Whether the state machine permits moving to `next`.
    pub fn can_transition_to(self, next: UsageStatus) -> bool {
        match (self, next) {
            (UsageStatus::Applied, UsageStatus::Completed)
            | (UsageStatus::Applied, UsageStatus::Refunded)
            | (UsageStatus::Applied, UsageStatus::Cancelled)
            | (UsageStatus::Completed, UsageStatus::Refunded) => true,
            _ => false,
        }
    }
}

/// A coupon usage row: the audit trail of one redemption attempt,
/// referencing exactly one order. Never deleted.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub coupon_code: String,
    pub customer_id: Uuid,
    pub order_id: Uuid,

    pub discount_type: CouponType,
    pub discount_applied_cents: i64,
    pub order_total_cents: i64,
    pub order_total_after_discount_cents: i64,

    /// Precomputed at apply time for cashback coupons, credited on completion
    pub cashback_amount_cents: i64,
    pub cashback_credited: bool,
    pub cashback_credited_at: Option<DateTime<Utc>>,

    pub customer_ip: Option<String>,
    pub device_id: Option<String>,
    pub user_agent: Option<String>,

    pub status: UsageStatus,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub used_at: DateTime<Utc>,
}

/// Client metadata captured for abuse detection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageMeta {
    pub customer_ip: Option<String>,
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
}

/// Request body for the pre-checkout validation preview.
#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub customer_id: Uuid,
    pub cart_items: Vec<CartItem>,
    pub cart_total_cents: i64,
    #[serde(flatten)]
    pub meta: UsageMeta,
}

/// Request body for applying a coupon at order creation.
#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub discount_applied_cents: i64,
    pub order_total_cents: i64,
    #[serde(flatten)]
    pub meta: UsageMeta,
}

/// Request body for refunding a usage on order cancellation.
#[derive(Debug, Deserialize)]
pub struct RefundCouponRequest {
    pub order_id: Uuid,
    pub reason: Option<String>,
}

/// Response for apply: the caller keeps the usage id for its records.
#[derive(Debug, Serialize)]
pub struct ApplyCouponResponse {
    pub usage_id: Uuid,
    pub status: UsageStatus,
}

impl From<&CouponUsage> for ApplyCouponResponse {
    fn from(usage: &CouponUsage) -> Self {
        Self {
            usage_id: usage.id,
            status: usage.status,
        }
    }
}
