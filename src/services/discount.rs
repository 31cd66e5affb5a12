//! Discount calculator - pure functions mapping (coupon, amounts) to a
//! discount in cents.
//!
//! Everything here is integer cents arithmetic; percentage math floors.
//! The output of [`compute`] is always within `[0, cart_total_cents]`.

use crate::models::coupon::{Coupon, CouponType};

/// Immediate discount for a coupon against a cart.
///
/// `applicable_cents` is the discount base: the whole cart for untargeted
/// coupons, or the sum of only the matching lines for category/seller/
/// product targeting.
///
/// - `flat`: `min(value, applicable)`
/// - `percentage`: `applicable * value / 100`, capped by `max_discount_cents`
/// - `free_delivery`: 0 - the fee waiver is applied by the checkout flow
/// - `bogo`: 0 - cheapest-item-free logic belongs to cart computation
/// - `cashback`: 0 - nothing is deducted up front; the credit happens on
///   order completion (see [`cashback_amount`])
pub fn compute(coupon: &Coupon, cart_total_cents: i64, applicable_cents: i64) -> i64 {
    let discount = match coupon.coupon_type {
        CouponType::Flat => coupon.value.min(applicable_cents),
        CouponType::Percentage => {
            percentage(coupon.value, coupon.max_discount_cents, applicable_cents)
        }
        CouponType::FreeDelivery | CouponType::Bogo | CouponType::Cashback => 0,
    };

    discount.clamp(0, cart_total_cents.max(0))
}

/// Cashback a coupon earns, computed percentage-style against `base_cents`
/// and clamped to `[0, clamp_cents]`.
///
/// Used both for the validation preview (base = applicable amount) and at
/// apply time (base = order total). Returns 0 for non-cashback coupons.
pub fn cashback_amount(coupon: &Coupon, base_cents: i64, clamp_cents: i64) -> i64 {
    if coupon.coupon_type != CouponType::Cashback {
        return 0;
    }

    percentage(coupon.value, coupon.max_discount_cents, base_cents).clamp(0, clamp_cents.max(0))
}

fn percentage(value: i64, max_discount_cents: Option<i64>, base_cents: i64) -> i64 {
    let mut discount = base_cents * value / 100;
    if let Some(cap) = max_discount_cents {
        discount = discount.min(cap);
    }
    discount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::coupon::{ApplicableTo, CouponType};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn coupon(coupon_type: CouponType, value: i64, max_discount_cents: Option<i64>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            name: "Test".to_string(),
            description: None,
            coupon_type,
            value,
            max_discount_cents,
            min_order_value_cents: 0,
            max_usage_per_user: 1,
            total_usage_limit: None,
            current_usage_count: 0,
            applicable_to: ApplicableTo::All,
            target_categories: vec![],
            target_sellers: vec![],
            target_products: vec![],
            allowed_users: vec![],
            blocked_users: vec![],
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(30),
            time_slots: None,
            is_visible: true,
            is_hidden: false,
            is_active: true,
            cooldown_hours: 0,
            max_discount_per_day_cents: None,
            min_orders_required: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn flat_discount_is_value_capped_by_applicable_amount() {
        let c = coupon(CouponType::Flat, 10_000, None);
        assert_eq!(compute(&c, 50_000, 50_000), 10_000);
        // Applicable base smaller than the flat value
        assert_eq!(compute(&c, 50_000, 6_000), 6_000);
    }

    #[test]
    fn percentage_discount_respects_max_discount_cap() {
        // 10% of 1000.00 = 100.00, capped to 50.00
        let c = coupon(CouponType::Percentage, 10, Some(5_000));
        assert_eq!(compute(&c, 100_000, 100_000), 5_000);

        // Uncapped
        let c = coupon(CouponType::Percentage, 10, None);
        assert_eq!(compute(&c, 100_000, 100_000), 10_000);
    }

    #[test]
    fn percentage_floors_fractional_cents() {
        let c = coupon(CouponType::Percentage, 3, None);
        // 3% of 0.99 = 0.0297 -> floors to 0.02
        assert_eq!(compute(&c, 99, 99), 2);
    }

    #[test]
    fn free_delivery_and_bogo_yield_zero_here() {
        assert_eq!(compute(&coupon(CouponType::FreeDelivery, 0, None), 50_000, 50_000), 0);
        assert_eq!(compute(&coupon(CouponType::Bogo, 0, None), 50_000, 50_000), 0);
    }

    #[test]
    fn cashback_has_no_immediate_discount() {
        let c = coupon(CouponType::Cashback, 10, None);
        assert_eq!(compute(&c, 50_000, 50_000), 0);
    }

    #[test]
    fn cashback_amount_is_percentage_style() {
        let c = coupon(CouponType::Cashback, 10, None);
        assert_eq!(cashback_amount(&c, 50_000, 50_000), 5_000);

        let capped = coupon(CouponType::Cashback, 10, Some(2_000));
        assert_eq!(cashback_amount(&capped, 50_000, 50_000), 2_000);

        // Non-cashback coupons earn nothing
        let flat = coupon(CouponType::Flat, 10_000, None);
        assert_eq!(cashback_amount(&flat, 50_000, 50_000), 0);
    }

    #[test]
    fn discount_never_exceeds_cart_total() {
        let c = coupon(CouponType::Flat, 100_000, None);
        // Targeted base larger than the payable cart total
        assert_eq!(compute(&c, 20_000, 80_000), 20_000);
    }

    #[test]
    fn discount_is_never_negative() {
        let c = coupon(CouponType::Flat, 10_000, None);
        assert_eq!(compute(&c, 0, 0), 0);
        assert_eq!(compute(&c, -1, -1), 0);
    }
}
