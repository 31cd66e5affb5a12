//! Coupon catalog and usage ledger service.
//!
//! The validation path is deliberately infallible: [`validate_coupon`]
//! always produces a `ValidationResult`, degrading storage errors to a
//! `VALIDATION_ERROR` rejection. Better to deny a discount than to grant
//! one on a half-read snapshot.
//!
//! Apply/complete/refund are collaborator calls from the order system.
//! Each is idempotent per `order_id` and uses single conditional UPDATE
//! statements rather than read-modify-write, so concurrent retries settle
//! on one winner.

use chrono::Utc;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::cart::{Rejection, RejectionCode, ValidationResult};
use crate::models::coupon::{
    ApplicableTo, AvailableCoupon, Coupon, CouponType, CreateCouponRequest,
};
use crate::models::coupon_usage::{
    ApplyCouponRequest, CouponUsage, RefundCouponRequest, UsageMeta, UsageStatus,
    ValidateCouponRequest,
};
use crate::models::pagination::{Paginated, Pagination};
use crate::models::wallet::TxnSource;
use crate::services::{coupon_rules, discount, wallet_service};
use crate::services::coupon_rules::UsageStats;

/// Days a cashback credit stays spendable before the sweeper claims it back.
const CASHBACK_EXPIRY_DAYS: i64 = 30;

/// Upper-case and validate a coupon code: 3-20 alphanumeric characters.
fn normalize_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_uppercase();
    if code.len() < 3 || code.len() > 20 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidRequest(
            "Coupon code must be 3-20 alphanumeric characters".to_string(),
        ));
    }
    Ok(code)
}

/// Create a coupon. Codes are stored upper-cased and are immutable after
/// creation; retiring a coupon means flipping `is_active`, never deleting.
///
/// # Errors
///
/// - `InvalidRequest`: malformed code, non-positive value, percentage over
///   100, inverted validity window, or duplicate code
pub async fn create_coupon(pool: &DbPool, req: CreateCouponRequest) -> Result<Coupon, AppError> {
    let code = normalize_code(&req.code)?;

    if req.value <= 0 {
        return Err(AppError::InvalidRequest(
            "Coupon value must be positive".to_string(),
        ));
    }
    if matches!(req.coupon_type, CouponType::Percentage | CouponType::Cashback) && req.value > 100 {
        return Err(AppError::InvalidRequest(
            "Percentage value cannot exceed 100".to_string(),
        ));
    }

    let valid_from = req.valid_from.unwrap_or_else(Utc::now);
    if req.valid_until <= valid_from {
        return Err(AppError::InvalidRequest(
            "valid_until must be after valid_from".to_string(),
        ));
    }

    let result = sqlx::query_as::<_, Coupon>(
        r#"
        INSERT INTO coupons (
            code, name, description, coupon_type, value, max_discount_cents,
            min_order_value_cents, max_usage_per_user, total_usage_limit,
            applicable_to, target_categories, target_sellers, target_products,
            allowed_users, blocked_users, valid_from, valid_until, time_slots,
            is_visible, is_hidden, cooldown_hours, max_discount_per_day_cents,
            min_orders_required
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
            $16, $17, $18, $19, $20, $21, $22, $23
        )
        RETURNING *
        "#,
    )
    .bind(&code)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.coupon_type)
    .bind(req.value)
    .bind(req.max_discount_cents)
    .bind(req.min_order_value_cents)
    .bind(req.max_usage_per_user)
    .bind(req.total_usage_limit)
    .bind(req.applicable_to)
    .bind(&req.target_categories)
    .bind(&req.target_sellers)
    .bind(&req.target_products)
    .bind(&req.allowed_users)
    .bind(&req.blocked_users)
    .bind(valid_from)
    .bind(req.valid_until)
    .bind(req.time_slots.map(Json))
    .bind(req.is_visible)
    .bind(req.is_hidden)
    .bind(req.cooldown_hours)
    .bind(req.max_discount_per_day_cents)
    .bind(req.min_orders_required)
    .fetch_one(pool)
    .await;

    match result {
        Ok(coupon) => {
            tracing::info!(code = %coupon.code, coupon_type = ?coupon.coupon_type, "coupon created");
            Ok(coupon)
        }
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
            AppError::InvalidRequest("A coupon with this code already exists".to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

async fn find_by_code(pool: &DbPool, code: &str) -> Result<Option<Coupon>, AppError> {
    let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(coupon)
}

/// Gather the read-only usage snapshot the rules engine evaluates against.
async fn collect_usage_stats(
    pool: &DbPool,
    coupon: &Coupon,
    customer_id: Uuid,
    meta: &UsageMeta,
) -> Result<UsageStats, AppError> {
    // Per-user count includes refunded uses; the last-use timestamp for the
    // cooldown does not
    let user_usage_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND customer_id = $2",
    )
    .bind(coupon.id)
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    let last_used_at = sqlx::query_scalar(
        r#"
        SELECT MAX(used_at) FROM coupon_usages
        WHERE coupon_id = $1 AND customer_id = $2 AND status <> 'refunded'
        "#,
    )
    .bind(coupon.id)
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    let ip_usage_count_24h = match &meta.customer_ip {
        Some(ip) => {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM coupon_usages
                WHERE coupon_id = $1 AND customer_ip = $2
                  AND used_at >= NOW() - INTERVAL '24 hours'
                "#,
            )
            .bind(coupon.id)
            .bind(ip)
            .fetch_one(pool)
            .await?
        }
        None => 0,
    };

    let daily_discount_cents: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(discount_applied_cents), 0) FROM coupon_usages
        WHERE customer_id = $1 AND status <> 'refunded'
          AND used_at >= date_trunc('day', NOW())
        "#,
    )
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    let delivered_orders: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE customer_id = $1 AND status = 'delivered'",
    )
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    Ok(UsageStats {
        user_usage_count,
        last_used_at,
        ip_usage_count_24h,
        daily_discount_cents,
        delivered_orders,
    })
}

/// Pre-checkout validation: does this coupon apply to this cart, and for
/// how much? Side-effect-free; nothing is reserved.
///
/// Never fails: storage errors are logged and reported as a
/// `VALIDATION_ERROR` rejection.
pub async fn validate_coupon(pool: &DbPool, req: &ValidateCouponRequest) -> ValidationResult {
    match try_validate(pool, req).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(code = %req.code, error = %e, "coupon validation failed");
            Rejection::new(
                RejectionCode::ValidationError,
                "Unable to validate coupon, please try again",
            )
            .into()
        }
    }
}

async fn try_validate(
    pool: &DbPool,
    req: &ValidateCouponRequest,
) -> Result<ValidationResult, AppError> {
    let code = match normalize_code(&req.code) {
        Ok(code) => code,
        Err(_) => {
            return Ok(Rejection::new(RejectionCode::InvalidCode, "Invalid coupon code").into());
        }
    };

    let coupon = match find_by_code(pool, &code).await? {
        Some(coupon) if coupon.is_active => coupon,
        _ => {
            return Ok(Rejection::new(RejectionCode::InvalidCode, "Invalid coupon code").into());
        }
    };

    let stats = collect_usage_stats(pool, &coupon, req.customer_id, &req.meta).await?;

    Ok(coupon_rules::evaluate(
        &coupon,
        req.customer_id,
        &req.cart_items,
        req.cart_total_cents,
        &stats,
        Utc::now(),
    ))
}

/// Record a redemption at order creation.
///
/// Idempotent per `order_id`: a repeat call returns the existing usage row
/// untouched. Otherwise the global usage counter is claimed with one
/// conditional increment, so two concurrent applies of the last remaining
/// use cannot both succeed.
///
/// # Errors
///
/// - `CouponNotFound`: no such code
/// - `CouponLimitExhausted`: global usage limit already reached
/// - `Database`: storage failure
pub async fn apply_coupon(pool: &DbPool, req: &ApplyCouponRequest) -> Result<CouponUsage, AppError> {
    if req.order_total_cents < 0
        || req.discount_applied_cents < 0
        || req.discount_applied_cents > req.order_total_cents
    {
        return Err(AppError::InvalidRequest(
            "Discount must be between 0 and the order total".to_string(),
        ));
    }

    let code = normalize_code(&req.code).map_err(|_| AppError::CouponNotFound)?;
    let coupon = find_by_code(pool, &code).await?.ok_or(AppError::CouponNotFound)?;

    if let Some(existing) = find_usage(pool, req.order_id).await? {
        tracing::debug!(order_id = %req.order_id, "coupon already applied to order");
        return Ok(existing);
    }

    // Claim one use: the WHERE clause makes the increment a no-op once the
    // global limit is reached
    let claimed = sqlx::query(
        r#"
        UPDATE coupons
        SET current_usage_count = current_usage_count + 1, updated_at = NOW()
        WHERE id = $1
          AND (total_usage_limit IS NULL OR current_usage_count < total_usage_limit)
        "#,
    )
    .bind(coupon.id)
    .execute(pool)
    .await?;

    if claimed.rows_affected() == 0 {
        return Err(AppError::CouponLimitExhausted);
    }

    // Cashback is locked in now and credited when the order completes
    let cashback_amount_cents =
        discount::cashback_amount(&coupon, req.order_total_cents, req.order_total_cents);

    let inserted = sqlx::query_as::<_, CouponUsage>(
        r#"
        INSERT INTO coupon_usages (
            coupon_id, coupon_code, customer_id, order_id, discount_type,
            discount_applied_cents, order_total_cents,
            order_total_after_discount_cents, cashback_amount_cents,
            customer_ip, device_id, user_agent
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(coupon.id)
    .bind(&coupon.code)
    .bind(req.customer_id)
    .bind(req.order_id)
    .bind(coupon.coupon_type)
    .bind(req.discount_applied_cents)
    .bind(req.order_total_cents)
    .bind(req.order_total_cents - req.discount_applied_cents)
    .bind(cashback_amount_cents)
    .bind(&req.meta.customer_ip)
    .bind(&req.meta.device_id)
    .bind(&req.meta.user_agent)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(usage) => {
            tracing::info!(
                code = %coupon.code,
                order_id = %req.order_id,
                discount_cents = req.discount_applied_cents,
                "coupon applied"
            );
            Ok(usage)
        }
        Err(e) => {
            // Give the claimed use back before reporting the failure
            release_usage_claim(pool, coupon.id).await;

            match e {
                // Lost the idempotency race: another apply for this order
                // landed first, return its row
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    find_usage(pool, req.order_id)
                        .await?
                        .ok_or(AppError::UsageNotFound)
                }
                e => Err(e.into()),
            }
        }
    }
}

async fn release_usage_claim(pool: &DbPool, coupon_id: Uuid) {
    let result = sqlx::query(
        r#"
        UPDATE coupons
        SET current_usage_count = GREATEST(current_usage_count - 1, 0), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(coupon_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(%coupon_id, error = %e, "failed to release coupon usage claim");
    }
}

/// Whether a usage still owes its cashback credit: completed, carries an
/// amount, and the credit has not been claimed. Mirrors the claim UPDATE's
/// WHERE clause; in particular a refunded usage never qualifies.
fn cashback_claimable(usage: &CouponUsage) -> bool {
    usage.status == UsageStatus::Completed
        && usage.cashback_amount_cents > 0
        && !usage.cashback_credited
}

/// Resolve a guarded status flip that matched no row. A repeat of an
/// already-settled transition is idempotent; a transition the state
/// machine still allows means the row moved concurrently and the caller
/// should retry; anything else is a one-way violation.
fn resolve_unmatched_flip(
    existing: CouponUsage,
    target: UsageStatus,
    action: &str,
) -> Result<CouponUsage, AppError> {
    if existing.status == target {
        return Ok(existing);
    }
    if existing.status.can_transition_to(target) {
        return Err(AppError::InvalidRequest(format!(
            "Order changed concurrently, retry the {action}"
        )));
    }
    Err(AppError::InvalidRequest(format!(
        "Cannot {action} a {:?} coupon usage",
        existing.status
    )))
}

async fn find_usage(pool: &DbPool, order_id: Uuid) -> Result<Option<CouponUsage>, AppError> {
    let usage = sqlx::query_as::<_, CouponUsage>("SELECT * FROM coupon_usages WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;
    Ok(usage)
}

/// Mark an order's redemption completed and credit any cashback.
///
/// The cashback credit is exactly-once: a conditional claim flips
/// `cashback_credited` first, and only the claim winner calls the wallet.
/// If the wallet credit then fails, the owed amount is persisted as a
/// pending reversal for reconciliation; completion itself still succeeds
/// (there is no cross-entity transaction to roll back).
///
/// # Errors
///
/// - `UsageNotFound`: no redemption for this order
/// - `InvalidRequest`: the usage was refunded or cancelled
pub async fn complete_usage(pool: &DbPool, order_id: Uuid) -> Result<CouponUsage, AppError> {
    let flipped = sqlx::query_as::<_, CouponUsage>(
        r#"
        UPDATE coupon_usages
        SET status = 'completed'
        WHERE order_id = $1 AND status = 'applied'
        RETURNING *
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    let mut usage = match flipped {
        Some(usage) => usage,
        None => {
            let existing = find_usage(pool, order_id).await?.ok_or(AppError::UsageNotFound)?;
            return resolve_unmatched_flip(existing, UsageStatus::Completed, "complete");
        }
    };

    // Exactly-once cashback: win the claim before touching the wallet.
    // The status condition re-checks the row in the database - a refund
    // that lands between the flip above and this claim flips the status
    // away from 'completed' and must also void the cashback, otherwise
    // the customer keeps a credit on a refunded order with no reversal.
    let claim = if cashback_claimable(&usage) {
        sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE coupon_usages
            SET cashback_credited = TRUE, cashback_credited_at = NOW()
            WHERE order_id = $1
              AND status = 'completed'
              AND cashback_amount_cents > 0
              AND NOT cashback_credited
            RETURNING cashback_amount_cents
            "#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await?
    } else {
        None
    };

    if let Some(amount_cents) = claim {
        usage.cashback_credited = true;
        usage.cashback_credited_at = Some(Utc::now());

        let credited = wallet_service::credit(
            pool,
            usage.customer_id,
            amount_cents,
            TxnSource::Cashback,
            Some(format!("Cashback from coupon {}", usage.coupon_code)),
            Some(order_id),
            Some(usage.coupon_id),
            CASHBACK_EXPIRY_DAYS,
        )
        .await;

        if let Err(e) = credited {
            tracing::error!(
                %order_id,
                customer_id = %usage.customer_id,
                amount_cents,
                error = %e,
                "cashback claimed but wallet credit failed, recording pending reversal"
            );
            // Negative amount: the customer is owed this credit
            log_pending_reversal(
                pool,
                usage.customer_id,
                order_id,
                -amount_cents,
                "cashback credit failed after claim",
            )
            .await;
        }
    }

    tracing::info!(%order_id, code = %usage.coupon_code, "coupon usage completed");
    Ok(usage)
}

/// Cancel an order's redemption on checkout abandonment.
///
/// Only an `applied` usage can be cancelled; nothing has been credited
/// yet, so the only side effect is giving the global usage claim back.
///
/// # Errors
///
/// - `UsageNotFound`: no redemption for this order
/// - `InvalidRequest`: the usage was already completed or refunded
pub async fn cancel_usage(pool: &DbPool, order_id: Uuid) -> Result<CouponUsage, AppError> {
    let flipped = sqlx::query_as::<_, CouponUsage>(
        r#"
        UPDATE coupon_usages
        SET status = 'cancelled'
        WHERE order_id = $1 AND status = 'applied'
        RETURNING *
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    let usage = match flipped {
        Some(usage) => usage,
        None => {
            let existing = find_usage(pool, order_id).await?.ok_or(AppError::UsageNotFound)?;
            return resolve_unmatched_flip(existing, UsageStatus::Cancelled, "cancel");
        }
    };

    release_usage_claim(pool, usage.coupon_id).await;

    tracing::info!(%order_id, code = %usage.coupon_code, "coupon usage cancelled");
    Ok(usage)
}

/// Refund an order's redemption.
///
/// No-op when already refunded. Gives the global usage claim back (floored
/// at zero) and reverses credited cashback with a wallet debit. A reversal
/// blocked by balance or freeze is skipped and persisted as a pending
/// reversal, never retried inline.
///
/// # Errors
///
/// - `UsageNotFound`: no redemption for this order
/// - `InvalidRequest`: the usage was cancelled
pub async fn refund_usage(pool: &DbPool, req: &RefundCouponRequest) -> Result<CouponUsage, AppError> {
    let flipped = sqlx::query_as::<_, CouponUsage>(
        r#"
        UPDATE coupon_usages
        SET status = 'refunded', refunded_at = NOW(), refund_reason = $2
        WHERE order_id = $1 AND status IN ('applied', 'completed')
        RETURNING *
        "#,
    )
    .bind(req.order_id)
    .bind(&req.reason)
    .fetch_optional(pool)
    .await?;

    let usage = match flipped {
        Some(usage) => usage,
        None => {
            let existing = find_usage(pool, req.order_id)
                .await?
                .ok_or(AppError::UsageNotFound)?;
            return resolve_unmatched_flip(existing, UsageStatus::Refunded, "refund");
        }
    };

    release_usage_claim(pool, usage.coupon_id).await;

    if usage.cashback_credited && usage.cashback_amount_cents > 0 {
        let reversed = wallet_service::debit(
            pool,
            usage.customer_id,
            usage.cashback_amount_cents,
            TxnSource::Refund,
            Some(req.order_id),
            Some(format!("Cashback reversed: order refunded ({})", usage.coupon_code)),
        )
        .await;

        match reversed {
            Ok(_) => {}
            Err(e @ (AppError::InsufficientBalance { .. } | AppError::WalletFrozen)) => {
                tracing::warn!(
                    order_id = %req.order_id,
                    customer_id = %usage.customer_id,
                    amount_cents = usage.cashback_amount_cents,
                    error = %e,
                    "cashback reversal skipped, recording pending reversal"
                );
                log_pending_reversal(
                    pool,
                    usage.customer_id,
                    req.order_id,
                    usage.cashback_amount_cents,
                    "cashback reversal skipped on refund",
                )
                .await;
            }
            Err(e) => {
                tracing::error!(
                    order_id = %req.order_id,
                    customer_id = %usage.customer_id,
                    error = %e,
                    "cashback reversal failed, recording pending reversal"
                );
                log_pending_reversal(
                    pool,
                    usage.customer_id,
                    req.order_id,
                    usage.cashback_amount_cents,
                    "cashback reversal failed on refund",
                )
                .await;
            }
        }
    }

    tracing::info!(order_id = %req.order_id, code = %usage.coupon_code, "coupon usage refunded");
    Ok(usage)
}

/// Best-effort pending-reversal write. The reversal record must never fail
/// the flow that produced it, so errors here are only logged.
async fn log_pending_reversal(
    pool: &DbPool,
    customer_id: Uuid,
    order_id: Uuid,
    amount_cents: i64,
    reason: &str,
) {
    if let Err(e) =
        wallet_service::record_pending_reversal(pool, customer_id, order_id, amount_cents, reason)
            .await
    {
        tracing::error!(%customer_id, %order_id, error = %e, "failed to record pending reversal");
    }
}

/// Coupons this customer could use right now, annotated with whether the
/// current cart total already qualifies. Hidden coupons never appear.
pub async fn get_available_coupons(
    pool: &DbPool,
    customer_id: Uuid,
    cart_total_cents: i64,
) -> Result<Vec<AvailableCoupon>, AppError> {
    let coupons = sqlx::query_as::<_, Coupon>(
        r#"
        SELECT * FROM coupons
        WHERE is_active AND is_visible AND NOT is_hidden
          AND valid_from <= NOW() AND valid_until > NOW()
          AND (total_usage_limit IS NULL OR current_usage_count < total_usage_limit)
          AND NOT ($1 = ANY(blocked_users))
          AND (applicable_to <> 'specific_users' OR $1 = ANY(allowed_users))
        ORDER BY min_order_value_cents ASC
        "#,
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    let usage_counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT coupon_id, COUNT(*) FROM coupon_usages WHERE customer_id = $1 GROUP BY coupon_id",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let delivered_orders: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE customer_id = $1 AND status = 'delivered'",
    )
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    let available = coupons
        .iter()
        .filter(|c| usage_counts.get(&c.id).copied().unwrap_or(0) < c.max_usage_per_user)
        .filter(|c| !(c.applicable_to == ApplicableTo::NewUsers && delivered_orders > 0))
        .filter(|c| delivered_orders >= c.min_orders_required)
        .map(|c| {
            let can_apply = cart_total_cents >= c.min_order_value_cents;
            AvailableCoupon {
                id: c.id,
                code: c.code.clone(),
                name: c.name.clone(),
                description: c.description.clone(),
                coupon_type: c.coupon_type,
                display_discount: c.discount_display(),
                min_order_value_cents: c.min_order_value_cents,
                valid_until: c.valid_until,
                can_apply,
                amount_needed_cents: if can_apply {
                    0
                } else {
                    c.min_order_value_cents - cart_total_cents
                },
            }
        })
        .collect();

    Ok(available)
}

/// A customer's redemption history, newest first.
pub async fn get_coupon_history(
    pool: &DbPool,
    customer_id: Uuid,
    pagination: &Pagination,
) -> Result<Paginated<CouponUsage>, AppError> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(pool)
            .await?;

    let usages = sqlx::query_as::<_, CouponUsage>(
        r#"
        SELECT * FROM coupon_usages
        WHERE customer_id = $1
        ORDER BY used_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(customer_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(usages, pagination, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(status: UsageStatus) -> CouponUsage {
        CouponUsage {
            id: Uuid::new_v4(),
            coupon_id: Uuid::new_v4(),
            coupon_code: "CB10".to_string(),
            customer_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            discount_type: CouponType::Cashback,
            discount_applied_cents: 0,
            order_total_cents: 50_000,
            order_total_after_discount_cents: 50_000,
            cashback_amount_cents: 5_000,
            cashback_credited: false,
            cashback_credited_at: None,
            customer_ip: None,
            device_id: None,
            user_agent: None,
            status,
            refunded_at: None,
            refund_reason: None,
            used_at: Utc::now(),
        }
    }

    #[test]
    fn codes_are_trimmed_and_upper_cased() {
        assert_eq!(normalize_code("  save10 ").unwrap(), "SAVE10");
        assert_eq!(normalize_code("FRESH50").unwrap(), "FRESH50");
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(normalize_code("ab").is_err());
        assert!(normalize_code("").is_err());
        assert!(normalize_code("SAVE-10").is_err());
        assert!(normalize_code("CODE WITH SPACE").is_err());
        assert!(normalize_code(&"X".repeat(21)).is_err());
    }

    #[test]
    fn cashback_is_claimable_only_while_completed() {
        assert!(cashback_claimable(&usage(UsageStatus::Completed)));

        // A refund that lands before the claim voids the cashback: the
        // customer must not keep a credit on a refunded order
        assert!(!cashback_claimable(&usage(UsageStatus::Refunded)));
        assert!(!cashback_claimable(&usage(UsageStatus::Applied)));
        assert!(!cashback_claimable(&usage(UsageStatus::Cancelled)));
    }

    #[test]
    fn cashback_claim_is_exactly_once() {
        let mut u = usage(UsageStatus::Completed);
        u.cashback_credited = true;
        assert!(!cashback_claimable(&u));

        let mut u = usage(UsageStatus::Completed);
        u.cashback_amount_cents = 0;
        assert!(!cashback_claimable(&u));
    }

    #[test]
    fn repeated_transition_is_a_no_op() {
        let existing = usage(UsageStatus::Refunded);
        let id = existing.id;
        let settled = resolve_unmatched_flip(existing, UsageStatus::Refunded, "refund")
            .expect("repeat refund should settle idempotently");
        assert_eq!(settled.id, id);
    }

    #[test]
    fn one_way_violations_are_rejected() {
        let err = resolve_unmatched_flip(usage(UsageStatus::Refunded), UsageStatus::Completed, "complete")
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = resolve_unmatched_flip(usage(UsageStatus::Completed), UsageStatus::Cancelled, "cancel")
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn still_legal_transition_signals_a_concurrent_change() {
        // The guarded UPDATE missed but the machine still allows the move:
        // the row changed under us, the caller should retry
        let err = resolve_unmatched_flip(usage(UsageStatus::Applied), UsageStatus::Refunded, "refund")
            .unwrap_err();
        match err {
            AppError::InvalidRequest(msg) => assert!(msg.contains("retry")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
