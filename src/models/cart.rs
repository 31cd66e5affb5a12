//! Cart line items and the coupon validation verdict.
//!
//! Validation failures are returned, not thrown: every rejected check
//! yields a structured result with a closed error-code enum so the caller
//! can render a specific user message. Unexpected storage errors degrade to
//! `ValidationError` - fail closed, never grant a discount on an error.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coupon::CouponSummary;

/// One line of the cart being checked out.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub category_id: Option<Uuid>,
    pub price_cents: i64,
    pub count: i64,
}

impl CartItem {
    pub fn line_total_cents(&self) -> i64 {
        self.price_cents * self.count
    }
}

/// Why a coupon was rejected. Closed enum; the serialized form matches the
/// contract consumed by checkout clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    InvalidCode,
    UserBlocked,
    NotYetValid,
    Expired,
    InvalidTimeSlot,
    MinOrderNotMet,
    LimitExhausted,
    MaxUsageReached,
    CooldownActive,
    SuspectedAbuse,
    NewUsersOnly,
    NotEligible,
    MinOrdersNotMet,
    NotApplicable,
    DailyLimitReached,
    ValidationError,
}

/// Verdict of the coupon rules engine.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ValidationResult {
    Valid(ValidCoupon),
    Invalid(Rejection),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    /// The rejection code, if this verdict is a rejection.
    pub fn rejection_code(&self) -> Option<RejectionCode> {
        match self {
            ValidationResult::Valid(_) => None,
            ValidationResult::Invalid(r) => Some(r.error_code),
        }
    }
}

/// Successful validation: the discount preview checkout will apply.
#[derive(Debug, Serialize)]
pub struct ValidCoupon {
    pub valid: bool,
    pub coupon: CouponSummary,
    /// Immediate discount off the payable total (0 for cashback coupons)
    pub discount_cents: i64,
    pub original_total_cents: i64,
    pub final_total_cents: i64,
    pub message: String,
    pub is_cashback: bool,
    /// Preview of the wallet credit a cashback coupon will earn on completion
    pub cashback_amount_cents: i64,
}

/// Failed validation, with enough context to render a specific message.
#[derive(Debug, Serialize)]
pub struct Rejection {
    pub valid: bool,
    pub error: String,
    pub error_code: RejectionCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_value_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_needed_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_usage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders_required: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_orders: Option<i64>,
}

impl Rejection {
    pub fn new(error_code: RejectionCode, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: error.into(),
            error_code,
            min_order_value_cents: None,
            amount_needed_cents: None,
            usage_count: None,
            max_usage: None,
            hours_remaining: None,
            orders_required: None,
            current_orders: None,
        }
    }
}

impl From<Rejection> for ValidationResult {
    fn from(rejection: Rejection) -> Self {
        ValidationResult::Invalid(rejection)
    }
}
