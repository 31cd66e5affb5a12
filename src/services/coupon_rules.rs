//! Coupon rules engine - the ordered eligibility chain.
//!
//! [`evaluate`] is pure: it sees the coupon, the cart and a prefetched
//! [`UsageStats`] snapshot, and produces a verdict without touching
//! storage. The check order is a behavioral contract (first failure wins),
//! not an implementation detail: client messaging depends on it.

use chrono::{DateTime, Datelike, Timelike, Utc};
use uuid::Uuid;

use crate::models::cart::{CartItem, Rejection, RejectionCode, ValidCoupon, ValidationResult};
use crate::models::coupon::{ApplicableTo, Coupon, CouponType, TimeSlot};
use crate::services::discount;

/// Same-coupon uses from one IP within 24h at or above this count are
/// rejected as suspected abuse.
pub const IP_ABUSE_THRESHOLD: i64 = 5;

/// Read-only usage snapshot gathered before evaluation.
#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    /// This customer's usage count for this coupon, any status
    pub user_usage_count: i64,
    /// When this customer last used this coupon (refunded uses excluded)
    pub last_used_at: Option<DateTime<Utc>>,
    /// Uses of this coupon from the caller's IP in the last 24 hours
    pub ip_usage_count_24h: i64,
    /// Discounts granted to this customer today across all coupons,
    /// refunded uses excluded
    pub daily_discount_cents: i64,
    /// The customer's delivered-order count
    pub delivered_orders: i64,
}

/// Run the eligibility chain and compute the discount.
///
/// The caller has already resolved the code to an active coupon (check 1,
/// `INVALID_CODE`); the remaining checks run here in the fixed order of
/// the contract. Never mutates anything - applying a coupon is a separate,
/// explicit step.
pub fn evaluate(
    coupon: &Coupon,
    customer_id: Uuid,
    cart_items: &[CartItem],
    cart_total_cents: i64,
    stats: &UsageStats,
    now: DateTime<Utc>,
) -> ValidationResult {
    // 2. Blocked users
    if coupon.blocked_users.contains(&customer_id) {
        return Rejection::new(
            RejectionCode::UserBlocked,
            "You are not eligible for this coupon",
        )
        .into();
    }

    // 3. Validity window
    if now < coupon.valid_from {
        return Rejection::new(
            RejectionCode::NotYetValid,
            format!("Coupon valid from {}", coupon.valid_from.format("%Y-%m-%d")),
        )
        .into();
    }
    if now > coupon.valid_until {
        return Rejection::new(RejectionCode::Expired, "Coupon has expired").into();
    }

    // 4. Recurring time slots
    let slots = coupon.time_slots();
    if !slots.is_empty()
        && !time_slot_matches(slots, now.hour(), now.weekday().num_days_from_sunday())
    {
        return Rejection::new(
            RejectionCode::InvalidTimeSlot,
            "Coupon not valid at this time. Check valid hours.",
        )
        .into();
    }

    // 5. Minimum order value, echoing the shortfall
    if cart_total_cents < coupon.min_order_value_cents {
        let amount_needed = coupon.min_order_value_cents - cart_total_cents;
        let mut rejection = Rejection::new(
            RejectionCode::MinOrderNotMet,
            format!(
                "Add {:.2} more to use this coupon",
                amount_needed as f64 / 100.0
            ),
        );
        rejection.min_order_value_cents = Some(coupon.min_order_value_cents);
        rejection.amount_needed_cents = Some(amount_needed);
        return rejection.into();
    }

    // 6. Global usage limit
    if let Some(limit) = coupon.total_usage_limit {
        if coupon.current_usage_count >= limit {
            return Rejection::new(RejectionCode::LimitExhausted, "Coupon limit exhausted").into();
        }
    }

    // 7. Per-user usage limit (any status - a refunded use still counts)
    if stats.user_usage_count >= coupon.max_usage_per_user {
        let mut rejection = Rejection::new(
            RejectionCode::MaxUsageReached,
            "You have already used this coupon",
        );
        rejection.usage_count = Some(stats.user_usage_count);
        rejection.max_usage = Some(coupon.max_usage_per_user);
        return rejection.into();
    }

    // 8. Cooldown between uses, reporting hours remaining rounded up
    if coupon.cooldown_hours > 0 {
        if let Some(last_used_at) = stats.last_used_at {
            let hours_since = (now - last_used_at).num_seconds() as f64 / 3600.0;
            if hours_since < coupon.cooldown_hours as f64 {
                let hours_remaining = (coupon.cooldown_hours as f64 - hours_since).ceil() as i64;
                let mut rejection = Rejection::new(
                    RejectionCode::CooldownActive,
                    format!(
                        "Please wait {} hour(s) before using this coupon again",
                        hours_remaining
                    ),
                );
                rejection.hours_remaining = Some(hours_remaining);
                return rejection.into();
            }
        }
    }

    // 9. IP heuristic. The message stays generic on purpose: the detection
    // reason must not leak to the client.
    if stats.ip_usage_count_24h >= IP_ABUSE_THRESHOLD {
        return Rejection::new(
            RejectionCode::SuspectedAbuse,
            "Unable to apply coupon. Please try again later.",
        )
        .into();
    }

    // 10. Eligibility (new users / specific users / order history)
    match coupon.applicable_to {
        ApplicableTo::NewUsers if stats.delivered_orders > 0 => {
            return Rejection::new(
                RejectionCode::NewUsersOnly,
                "This coupon is for new users only",
            )
            .into();
        }
        ApplicableTo::SpecificUsers if !coupon.allowed_users.contains(&customer_id) => {
            return Rejection::new(
                RejectionCode::NotEligible,
                "You are not eligible for this coupon",
            )
            .into();
        }
        _ => {}
    }
    if coupon.min_orders_required > 0 && stats.delivered_orders < coupon.min_orders_required {
        let mut rejection = Rejection::new(
            RejectionCode::MinOrdersNotMet,
            format!(
                "Complete {} orders to unlock this coupon",
                coupon.min_orders_required
            ),
        );
        rejection.orders_required = Some(coupon.min_orders_required);
        rejection.current_orders = Some(stats.delivered_orders);
        return rejection.into();
    }

    // 11. Applicability: the discount base is the sum of matching lines only
    let applicable_cents = match applicable_amount(coupon, cart_items) {
        Some(amount) => amount,
        None => {
            return Rejection::new(
                RejectionCode::NotApplicable,
                "Coupon not applicable on items in your cart",
            )
            .into();
        }
    };

    // 12. Daily discount cap across coupons
    if let Some(cap) = coupon.max_discount_per_day_cents {
        if stats.daily_discount_cents >= cap {
            return Rejection::new(
                RejectionCode::DailyLimitReached,
                "Daily discount limit reached. Try again tomorrow!",
            )
            .into();
        }
    }

    // 13. Compute the discount and build the verdict
    let discount_cents = discount::compute(coupon, cart_total_cents, applicable_cents);
    let final_total_cents = (cart_total_cents - discount_cents).max(0);
    let cashback_amount_cents = discount::cashback_amount(coupon, applicable_cents, cart_total_cents);

    ValidationResult::Valid(ValidCoupon {
        valid: true,
        coupon: coupon.into(),
        discount_cents,
        original_total_cents: cart_total_cents,
        final_total_cents,
        message: format!("You saved {:.2}!", discount_cents as f64 / 100.0),
        is_cashback: coupon.coupon_type == CouponType::Cashback,
        cashback_amount_cents,
    })
}

/// Whether the current hour and weekday fall inside any slot.
///
/// Hour ranges are half-open (`start <= h < end`); a slot whose start is
/// after its end wraps past midnight. Weekdays use 0 = Sunday.
pub fn time_slot_matches(slots: &[TimeSlot], hour: u32, weekday: u32) -> bool {
    for slot in slots {
        if !slot.days.is_empty() && !slot.days.contains(&weekday) {
            continue;
        }

        let in_range = if slot.start_hour <= slot.end_hour {
            hour >= slot.start_hour && hour < slot.end_hour
        } else {
            hour >= slot.start_hour || hour < slot.end_hour
        };

        if in_range {
            return true;
        }
    }

    false
}

/// The discount base for this coupon, or None when targeting matches no
/// cart line.
///
/// Untargeted modes (all / new_users / specific_users) use the whole cart;
/// category/seller/product targeting sums only the matching lines.
fn applicable_amount(coupon: &Coupon, cart_items: &[CartItem]) -> Option<i64> {
    match coupon.applicable_to {
        ApplicableTo::All | ApplicableTo::NewUsers | ApplicableTo::SpecificUsers => {
            Some(cart_items.iter().map(CartItem::line_total_cents).sum())
        }
        ApplicableTo::Category => {
            sum_matching(cart_items, |item| {
                item.category_id
                    .is_some_and(|id| coupon.target_categories.contains(&id))
            })
        }
        ApplicableTo::Seller => {
            sum_matching(cart_items, |item| coupon.target_sellers.contains(&item.seller_id))
        }
        ApplicableTo::Product => {
            sum_matching(cart_items, |item| coupon.target_products.contains(&item.product_id))
        }
    }
}

fn sum_matching(cart_items: &[CartItem], matches: impl Fn(&CartItem) -> bool) -> Option<i64> {
    let mut total = 0i64;
    let mut matched = false;

    for item in cart_items {
        if matches(item) {
            total += item.line_total_cents();
            matched = true;
        }
    }

    matched.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sqlx::types::Json;

    fn coupon(coupon_type: CouponType, value: i64) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "FLAT100".to_string(),
            name: "Flat off".to_string(),
            description: None,
            coupon_type,
            value,
            max_discount_cents: None,
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

    fn item(price_cents: i64, count: i64) -> CartItem {
        CartItem {
            product_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            category_id: Some(Uuid::new_v4()),
            price_cents,
            count,
        }
    }

    fn cart(total_cents: i64) -> Vec<CartItem> {
        vec![item(total_cents, 1)]
    }

    fn code_of(result: &ValidationResult) -> RejectionCode {
        result.rejection_code().expect("expected a rejection")
    }

    #[test]
    fn flat_coupon_applies_cleanly() {
        // FLAT100 on a 500.00 cart: discount 100.00, final 400.00
        let mut c = coupon(CouponType::Flat, 10_000);
        c.min_order_value_cents = 20_000;
        let customer = Uuid::new_v4();

        let result = evaluate(
            &c,
            customer,
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        match result {
            ValidationResult::Valid(v) => {
                assert_eq!(v.discount_cents, 10_000);
                assert_eq!(v.final_total_cents, 40_000);
                assert!(!v.is_cashback);
                assert_eq!(v.cashback_amount_cents, 0);
            }
            ValidationResult::Invalid(r) => panic!("unexpected rejection: {:?}", r.error_code),
        }
    }

    #[test]
    fn percentage_coupon_capped_by_max_discount() {
        // SAVE10: 10% of 1000.00 = 100.00, capped to 50.00 -> final 950.00
        let mut c = coupon(CouponType::Percentage, 10);
        c.max_discount_cents = Some(5_000);

        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(100_000),
            100_000,
            &UsageStats::default(),
            Utc::now(),
        );
        match result {
            ValidationResult::Valid(v) => {
                assert_eq!(v.discount_cents, 5_000);
                assert_eq!(v.final_total_cents, 95_000);
            }
            ValidationResult::Invalid(r) => panic!("unexpected rejection: {:?}", r.error_code),
        }
    }

    #[test]
    fn cashback_previews_credit_but_discounts_nothing() {
        let c = coupon(CouponType::Cashback, 10);

        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        match result {
            ValidationResult::Valid(v) => {
                assert_eq!(v.discount_cents, 0);
                assert_eq!(v.final_total_cents, 50_000);
                assert!(v.is_cashback);
                assert_eq!(v.cashback_amount_cents, 5_000);
            }
            ValidationResult::Invalid(r) => panic!("unexpected rejection: {:?}", r.error_code),
        }
    }

    #[test]
    fn blocked_user_is_rejected_before_anything_else() {
        let customer = Uuid::new_v4();
        let mut c = coupon(CouponType::Flat, 10_000);
        c.blocked_users = vec![customer];
        // Also expired - the block must win because it is checked first
        c.valid_until = Utc::now() - Duration::days(1);

        let result = evaluate(&c, customer, &cart(50_000), 50_000, &UsageStats::default(), Utc::now());
        assert_eq!(code_of(&result), RejectionCode::UserBlocked);
    }

    #[test]
    fn validity_window_is_enforced() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.valid_from = Utc::now() + Duration::days(1);
        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        assert_eq!(code_of(&result), RejectionCode::NotYetValid);

        let mut c = coupon(CouponType::Flat, 10_000);
        c.valid_until = Utc::now() - Duration::hours(1);
        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        assert_eq!(code_of(&result), RejectionCode::Expired);
    }

    #[test]
    fn time_slot_rejection_outside_window() {
        // Fixed clock: 10:00 UTC on a Monday
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();

        let mut c = coupon(CouponType::Flat, 10_000);
        // Anchor the validity window to the fixed clock, not the wall
        // clock, so the window check cannot preempt the slot check
        c.valid_from = now - Duration::days(1);
        c.valid_until = now + Duration::days(30);
        c.time_slots = Some(Json(vec![TimeSlot {
            start_hour: 12,
            end_hour: 14,
            days: vec![],
        }]));

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &UsageStats::default(), now);
        assert_eq!(code_of(&result), RejectionCode::InvalidTimeSlot);

        // 12:30 is inside the lunch window
        let lunch = Utc.with_ymd_and_hms(2025, 6, 2, 12, 30, 0).unwrap();
        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &UsageStats::default(), lunch);
        assert!(result.is_valid());
    }

    #[test]
    fn overnight_time_slot_wraps_past_midnight() {
        let slots = vec![TimeSlot {
            start_hour: 22,
            end_hour: 6,
            days: vec![],
        }];

        assert!(time_slot_matches(&slots, 23, 1));
        assert!(time_slot_matches(&slots, 2, 1));
        assert!(!time_slot_matches(&slots, 12, 1));
        // End hour is exclusive
        assert!(!time_slot_matches(&slots, 6, 1));
    }

    #[test]
    fn time_slot_day_filter_uses_sunday_zero() {
        let slots = vec![TimeSlot {
            start_hour: 9,
            end_hour: 17,
            days: vec![0, 6], // weekends only
        }];

        assert!(time_slot_matches(&slots, 10, 0));
        assert!(time_slot_matches(&slots, 10, 6));
        assert!(!time_slot_matches(&slots, 10, 3));
    }

    #[test]
    fn min_order_shortfall_is_echoed() {
        // Cart 150.00 against a 200.00 minimum -> shortfall 50.00
        let mut c = coupon(CouponType::Flat, 10_000);
        c.min_order_value_cents = 20_000;

        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(15_000),
            15_000,
            &UsageStats::default(),
            Utc::now(),
        );
        match result {
            ValidationResult::Invalid(r) => {
                assert_eq!(r.error_code, RejectionCode::MinOrderNotMet);
                assert_eq!(r.amount_needed_cents, Some(5_000));
                assert_eq!(r.min_order_value_cents, Some(20_000));
            }
            ValidationResult::Valid(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn exhausted_global_limit_is_rejected() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.total_usage_limit = Some(100);
        c.current_usage_count = 100;

        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        assert_eq!(code_of(&result), RejectionCode::LimitExhausted);
    }

    #[test]
    fn per_user_limit_counts_any_status() {
        let c = coupon(CouponType::Flat, 10_000); // max_usage_per_user = 1
        let stats = UsageStats {
            user_usage_count: 1,
            ..Default::default()
        };

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, Utc::now());
        match result {
            ValidationResult::Invalid(r) => {
                assert_eq!(r.error_code, RejectionCode::MaxUsageReached);
                assert_eq!(r.usage_count, Some(1));
                assert_eq!(r.max_usage, Some(1));
            }
            ValidationResult::Valid(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn cooldown_reports_hours_remaining_rounded_up() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.max_usage_per_user = 10;
        c.cooldown_hours = 24;

        let now = Utc::now();
        let stats = UsageStats {
            user_usage_count: 1,
            last_used_at: Some(now - Duration::hours(10) - Duration::minutes(30)),
            ..Default::default()
        };

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, now);
        match result {
            ValidationResult::Invalid(r) => {
                assert_eq!(r.error_code, RejectionCode::CooldownActive);
                // 13.5 hours left rounds up to 14
                assert_eq!(r.hours_remaining, Some(14));
            }
            ValidationResult::Valid(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn cooldown_expired_lets_the_coupon_through() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.max_usage_per_user = 10;
        c.cooldown_hours = 24;

        let now = Utc::now();
        let stats = UsageStats {
            user_usage_count: 1,
            last_used_at: Some(now - Duration::hours(25)),
            ..Default::default()
        };

        assert!(evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, now).is_valid());
    }

    #[test]
    fn suspicious_ip_gets_a_generic_rejection() {
        let c = coupon(CouponType::Flat, 10_000);
        let stats = UsageStats {
            ip_usage_count_24h: IP_ABUSE_THRESHOLD,
            ..Default::default()
        };

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, Utc::now());
        match result {
            ValidationResult::Invalid(r) => {
                assert_eq!(r.error_code, RejectionCode::SuspectedAbuse);
                // The message must not reveal the detection reason
                assert!(!r.error.to_lowercase().contains("ip"));
            }
            ValidationResult::Valid(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn new_users_coupon_rejects_customers_with_deliveries() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.applicable_to = ApplicableTo::NewUsers;
        let stats = UsageStats {
            delivered_orders: 3,
            ..Default::default()
        };

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, Utc::now());
        assert_eq!(code_of(&result), RejectionCode::NewUsersOnly);
    }

    #[test]
    fn specific_users_coupon_requires_allow_list_membership() {
        let allowed = Uuid::new_v4();
        let mut c = coupon(CouponType::Flat, 10_000);
        c.applicable_to = ApplicableTo::SpecificUsers;
        c.allowed_users = vec![allowed];

        let outsider = Uuid::new_v4();
        let result = evaluate(
            &c,
            outsider,
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        assert_eq!(code_of(&result), RejectionCode::NotEligible);

        assert!(
            evaluate(&c, allowed, &cart(50_000), 50_000, &UsageStats::default(), Utc::now())
                .is_valid()
        );
    }

    #[test]
    fn min_orders_required_gates_the_coupon() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.min_orders_required = 5;
        let stats = UsageStats {
            delivered_orders: 2,
            ..Default::default()
        };

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, Utc::now());
        match result {
            ValidationResult::Invalid(r) => {
                assert_eq!(r.error_code, RejectionCode::MinOrdersNotMet);
                assert_eq!(r.orders_required, Some(5));
                assert_eq!(r.current_orders, Some(2));
            }
            ValidationResult::Valid(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn targeted_coupon_discounts_only_matching_lines() {
        let seller = Uuid::new_v4();
        let mut c = coupon(CouponType::Percentage, 10);
        c.applicable_to = ApplicableTo::Seller;
        c.target_sellers = vec![seller];

        let mut matching = item(30_000, 1);
        matching.seller_id = seller;
        let other = item(20_000, 1);
        let items = vec![matching, other];

        let result = evaluate(&c, Uuid::new_v4(), &items, 50_000, &UsageStats::default(), Utc::now());
        match result {
            // 10% of the matching 300.00, not of the whole 500.00 cart
            ValidationResult::Valid(v) => assert_eq!(v.discount_cents, 3_000),
            ValidationResult::Invalid(r) => panic!("unexpected rejection: {:?}", r.error_code),
        }
    }

    #[test]
    fn targeted_coupon_with_no_matching_line_is_not_applicable() {
        let mut c = coupon(CouponType::Percentage, 10);
        c.applicable_to = ApplicableTo::Product;
        c.target_products = vec![Uuid::new_v4()];

        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(50_000),
            50_000,
            &UsageStats::default(),
            Utc::now(),
        );
        assert_eq!(code_of(&result), RejectionCode::NotApplicable);
    }

    #[test]
    fn daily_discount_cap_is_enforced() {
        let mut c = coupon(CouponType::Flat, 10_000);
        c.max_discount_per_day_cents = Some(20_000);
        let stats = UsageStats {
            daily_discount_cents: 20_000,
            ..Default::default()
        };

        let result = evaluate(&c, Uuid::new_v4(), &cart(50_000), 50_000, &stats, Utc::now());
        assert_eq!(code_of(&result), RejectionCode::DailyLimitReached);
    }

    #[test]
    fn min_order_check_precedes_usage_limits() {
        // Both violated; the earlier check in the chain must win
        let mut c = coupon(CouponType::Flat, 10_000);
        c.min_order_value_cents = 20_000;
        c.total_usage_limit = Some(1);
        c.current_usage_count = 1;

        let result = evaluate(
            &c,
            Uuid::new_v4(),
            &cart(15_000),
            15_000,
            &UsageStats::default(),
            Utc::now(),
        );
        assert_eq!(code_of(&result), RejectionCode::MinOrderNotMet);
    }
}
