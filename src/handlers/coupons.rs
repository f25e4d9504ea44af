//! `/api/applycop` and `/api/addCoupon`.
//!
//! Both keep the storefront's original wire format: camelCase bodies and
//! `{"message": ...}` on failure.

use crate::{
    auth::{AuthUser, ADMIN_ROLE},
    errors::{ApiError, ServiceError, StorefrontErrorBody},
    services::{
        commerce::pricing_service::DiscountKind,
        coupons::{NewCoupon, MSG_CODE_REQUIRED},
    },
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MSG_MISSING_FIELDS: &str = "Missing required fields";
pub const MSG_COUPON_ADDED: &str = "Coupon added successfully!";

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDiscount {
    pub discount_type: DiscountKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_value: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCouponRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub discount_type: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub discount_value: Option<Decimal>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

fn bad_request(message: &str) -> ApiError {
    ApiError::storefront(StatusCode::BAD_REQUEST, StorefrontErrorBody::message(message))
}

/// Validates a coupon and returns its discount terms.
///
/// No use is consumed here; checkout placement redeems the coupon.
pub async fn apply_coupon(
    State(state): State<AppState>,
    payload: Result<Json<ApplyCouponRequest>, JsonRejection>,
) -> Result<Json<CouponDiscount>, ApiError> {
    let code = payload
        .ok()
        .and_then(|Json(body)| body.code)
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| bad_request(MSG_CODE_REQUIRED))?;

    let terms = state
        .services
        .coupons
        .lookup(&code)
        .await
        .map_err(ApiError::storefront_message)?;

    Ok(Json(CouponDiscount {
        discount_type: terms.kind,
        discount_value: terms.value,
    }))
}

/// Creates a coupon. Admin only.
pub async fn add_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<AddCouponRequest>, JsonRejection>,
) -> Result<Json<MessageBody>, ApiError> {
    user.require_role(ADMIN_ROLE).map_err(|_| {
        ApiError::storefront_message(ServiceError::Forbidden(
            "Admin role required".to_string(),
        ))
    })?;

    let Ok(Json(body)) = payload else {
        return Err(bad_request(MSG_MISSING_FIELDS));
    };
    let (Some(code), Some(kind), Some(value), Some(max_uses)) = (
        body.id.filter(|s| !s.trim().is_empty()),
        body.discount_type.filter(|s| !s.trim().is_empty()),
        body.discount_value,
        body.max_uses.filter(|n| *n != 0),
    ) else {
        return Err(bad_request(MSG_MISSING_FIELDS));
    };

    let kind: DiscountKind = kind.parse().map_err(ApiError::storefront_message)?;
    let coupon = state
        .services
        .coupons
        .create_coupon(NewCoupon {
            code,
            kind,
            value,
            expires_at: body.expires_at,
            max_uses: Some(max_uses),
        })
        .await
        .map_err(ApiError::storefront_message)?;

    info!(coupon = %coupon.code, admin = %user.user_id, "Coupon added");
    Ok(Json(MessageBody {
        message: MSG_COUPON_ADDED.to_string(),
    }))
}
