//! Coupon HTTP handlers.
//!
//! - `POST /api/v1/coupons` - create a coupon (operator surface)
//! - `POST /api/v1/coupons/validate` - pre-checkout validation preview
//! - `POST /api/v1/coupons/apply` - record a redemption at order creation
//! - `POST /api/v1/coupons/complete/{order_id}` - order delivered
//! - `POST /api/v1/coupons/cancel/{order_id}` - checkout abandoned
//! - `POST /api/v1/coupons/refund` - order cancelled/refunded
//! - `GET /api/v1/coupons/available` - customer-facing coupon list
//! - `GET /api/v1/customers/{id}/coupon-history` - redemption history

use crate::{
    db::DbPool,
    error::AppError,
    models::cart::ValidationResult,
    models::coupon::{AvailableCoupon, Coupon, CreateCouponRequest},
    models::coupon_usage::{
        ApplyCouponRequest, ApplyCouponResponse, CouponUsage, RefundCouponRequest,
        ValidateCouponRequest,
    },
    models::pagination::{Paginated, Pagination},
    services::coupon_service,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Create a coupon.
///
/// # Request body
///
/// ```json
/// {
///   "code": "FRESH50",
///   "name": "50 off your first order",
///   "coupon_type": "flat",
///   "value": 5000,
///   "min_order_value_cents": 20000,
///   "valid_until": "2026-12-31T23:59:59Z",
///   "applicable_to": "new_users"
/// }
/// ```
pub async fn create_coupon(
    State(pool): State<DbPool>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), AppError> {
    let coupon = coupon_service::create_coupon(&pool, request).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// Validate a coupon against a cart before checkout.
///
/// Always returns 200: the body is either the discount preview
/// (`"valid": true`) or a structured rejection with an `error_code` the
/// client renders. Storage failures surface as `VALIDATION_ERROR`, never
/// as a 5xx that could be mistaken for a granted discount.
pub async fn validate_coupon(
    State(pool): State<DbPool>,
    Json(request): Json<ValidateCouponRequest>,
) -> Json<ValidationResult> {
    Json(coupon_service::validate_coupon(&pool, &request).await)
}

/// Record a redemption at order creation. Idempotent per `order_id`.
pub async fn apply_coupon(
    State(pool): State<DbPool>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApplyCouponResponse>, AppError> {
    let usage = coupon_service::apply_coupon(&pool, &request).await?;
    Ok(Json(ApplyCouponResponse::from(&usage)))
}

/// Mark an order's redemption completed; credits cashback exactly once.
pub async fn complete_coupon(
    State(pool): State<DbPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<CouponUsage>, AppError> {
    let usage = coupon_service::complete_usage(&pool, order_id).await?;
    Ok(Json(usage))
}

/// Cancel an order's redemption on checkout abandonment; releases the
/// usage claim.
pub async fn cancel_coupon(
    State(pool): State<DbPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<CouponUsage>, AppError> {
    let usage = coupon_service::cancel_usage(&pool, order_id).await?;
    Ok(Json(usage))
}

/// Refund an order's redemption; reverses credited cashback.
pub async fn refund_coupon(
    State(pool): State<DbPool>,
    Json(request): Json<RefundCouponRequest>,
) -> Result<Json<CouponUsage>, AppError> {
    let usage = coupon_service::refund_usage(&pool, &request).await?;
    Ok(Json(usage))
}

/// Query string for the available-coupon list.
#[derive(Debug, Deserialize)]
pub struct AvailableCouponsQuery {
    pub customer_id: Uuid,
    #[serde(default)]
    pub cart_total_cents: i64,
}

/// Coupons the customer can use right now, annotated with `can_apply`
/// against the current cart total.
pub async fn available_coupons(
    State(pool): State<DbPool>,
    Query(query): Query<AvailableCouponsQuery>,
) -> Result<Json<Vec<AvailableCoupon>>, AppError> {
    let coupons =
        coupon_service::get_available_coupons(&pool, query.customer_id, query.cart_total_cents)
            .await?;
    Ok(Json(coupons))
}

/// A customer's redemption history, newest first, paginated.
pub async fn coupon_history(
    State(pool): State<DbPool>,
    Path(customer_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<CouponUsage>>, AppError> {
    let history = coupon_service::get_coupon_history(&pool, customer_id, &pagination).await?;
    Ok(Json(history))
}
