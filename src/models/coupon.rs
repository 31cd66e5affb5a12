//! Coupon catalog models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// How a coupon's value is interpreted.
///
/// `value` on the coupon is cents for `Flat` and a whole percent for
/// `Percentage` and `Cashback`. `FreeDelivery` and `Bogo` carry no
/// immediate discount here; their effects belong to the checkout and cart
/// layers respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "coupon_type", rename_all = "snake_case")]
pub enum CouponType {
    Flat,
    Percentage,
    FreeDelivery,
    Bogo,
    Cashback,
}

/// Targeting mode of a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "applicable_to", rename_all = "snake_case")]
pub enum ApplicableTo {
    All,
    NewUsers,
    SpecificUsers,
    Category,
    Seller,
    Product,
}

/// A recurring validity window (lunch/dinner style deals).
///
/// Hours are 0-23; a slot with `start_hour > end_hour` wraps past midnight
/// (e.g. 22 → 6). `days` uses 0 = Sunday .. 6 = Saturday; an empty list
/// means every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default)]
    pub days: Vec<u32>,
}

/// A coupon row from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Coupon {
    pub id: Uuid,
    /// Unique alphanumeric code, stored upper-cased, immutable after creation
    pub code: String,
    pub name: String,
    pub description: Option<String>,

    pub coupon_type: CouponType,
    /// Cents for flat coupons, whole percent for percentage/cashback
    pub value: i64,
    /// Cap on a percentage/cashback discount; None = no cap
    pub max_discount_cents: Option<i64>,

    pub min_order_value_cents: i64,
    pub max_usage_per_user: i64,
    /// None = unlimited global usage
    pub total_usage_limit: Option<i64>,
    pub current_usage_count: i64,

    pub applicable_to: ApplicableTo,
    pub target_categories: Vec<Uuid>,
    pub target_sellers: Vec<Uuid>,
    pub target_products: Vec<Uuid>,
    pub allowed_users: Vec<Uuid>,
    pub blocked_users: Vec<Uuid>,

    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub time_slots: Option<Json<Vec<TimeSlot>>>,

    /// Shown in the coupon list
    pub is_visible: bool,
    /// Secret coupon, manual entry only
    pub is_hidden: bool,
    pub is_active: bool,

    /// Minimum gap between uses by the same customer, in hours (0 = none)
    pub cooldown_hours: i64,
    /// Per-customer cap on discounts granted per day; None = no cap
    pub max_discount_per_day_cents: Option<i64>,
    /// Delivered orders required before the coupon unlocks
    pub min_orders_required: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Human-readable discount label, e.g. "10% OFF (upto 50.00)".
    pub fn discount_display(&self) -> String {
        match self.coupon_type {
            CouponType::Flat => format!("{:.2} OFF", self.value as f64 / 100.0),
            CouponType::Percentage => match self.max_discount_cents {
                Some(cap) => format!("{}% OFF (upto {:.2})", self.value, cap as f64 / 100.0),
                None => format!("{}% OFF", self.value),
            },
            CouponType::FreeDelivery => "FREE DELIVERY".to_string(),
            CouponType::Cashback => match self.max_discount_cents {
                Some(cap) => format!("{}% Cashback (upto {:.2})", self.value, cap as f64 / 100.0),
                None => format!("{}% Cashback", self.value),
            },
            CouponType::Bogo => "Buy 1 Get 1 FREE".to_string(),
        }
    }

    pub fn time_slots(&self) -> &[TimeSlot] {
        match &self.time_slots {
            Some(Json(slots)) => slots,
            None => &[],
        }
    }
}

/// Operator request to create a coupon.
///
/// # Validation
///
/// - `code`: 3-20 alphanumeric characters, normalized to upper case
/// - `value`: must not exceed 100 for percentage coupons
/// - `valid_until` must be after `valid_from`
#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,

    pub coupon_type: CouponType,
    pub value: i64,
    pub max_discount_cents: Option<i64>,

    #[serde(default)]
    pub min_order_value_cents: i64,
    #[serde(default = "default_max_usage_per_user")]
    pub max_usage_per_user: i64,
    pub total_usage_limit: Option<i64>,

    #[serde(default = "default_applicable_to")]
    pub applicable_to: ApplicableTo,
    #[serde(default)]
    pub target_categories: Vec<Uuid>,
    #[serde(default)]
    pub target_sellers: Vec<Uuid>,
    #[serde(default)]
    pub target_products: Vec<Uuid>,
    #[serde(default)]
    pub allowed_users: Vec<Uuid>,
    #[serde(default)]
    pub blocked_users: Vec<Uuid>,

    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: DateTime<Utc>,
    pub time_slots: Option<Vec<TimeSlot>>,

    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub is_hidden: bool,

    #[serde(default)]
    pub cooldown_hours: i64,
    pub max_discount_per_day_cents: Option<i64>,
    #[serde(default)]
    pub min_orders_required: i64,
}

fn default_max_usage_per_user() -> i64 {
    1
}

fn default_applicable_to() -> ApplicableTo {
    ApplicableTo::All
}

fn default_true() -> bool {
    true
}

/// The subset of coupon fields echoed back in a successful validation.
#[derive(Debug, Clone, Serialize)]
pub struct CouponSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub coupon_type: CouponType,
    pub display_discount: String,
}

impl From<&Coupon> for CouponSummary {
    fn from(coupon: &Coupon) -> Self {
        Self {
            id: coupon.id,
            code: coupon.code.clone(),
            name: coupon.name.clone(),
            description: coupon.description.clone(),
            coupon_type: coupon.coupon_type,
            display_discount: coupon.discount_display(),
        }
    }
}

/// One entry of the customer-facing available-coupon list.
#[derive(Debug, Serialize)]
pub struct AvailableCoupon {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub coupon_type: CouponType,
    pub display_discount: String,
    pub min_order_value_cents: i64,
    pub valid_until: DateTime<Utc>,
    /// Whether the current cart already meets the minimum order value
    pub can_apply: bool,
    /// Shortfall to the minimum order value (0 when can_apply)
    pub amount_needed_cents: i64,
}
