use crate::{
    errors::{ApiError, ServiceError, StorefrontErrorBody},
    services::payments::GatewayOrder,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::error;

pub const MSG_INVALID_AMOUNT: &str = "Invalid amount";
pub const MSG_CREATE_FAILED: &str = "Unable to create order";

/// Positive JSON number, rounded to whole minor units.
fn parse_amount(body: &Value) -> Option<i64> {
    let amount = body.get("amount")?;
    if let Some(n) = amount.as_i64() {
        return (n > 0).then_some(n);
    }
    let f = amount.as_f64()?;
    let rounded = f.round();
    (f.is_finite() && rounded >= 1.0 && rounded <= i64::MAX as f64).then_some(rounded as i64)
}

/// `POST /api/createOrder`: creates a gateway order and returns it verbatim.
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GatewayOrder>, ApiError> {
    let amount = payload
        .ok()
        .and_then(|Json(body)| parse_amount(&body))
        .ok_or_else(|| {
            ApiError::storefront(
                StatusCode::BAD_REQUEST,
                StorefrontErrorBody::error(MSG_INVALID_AMOUNT),
            )
        })?;

    match state.services.checkout.create_gateway_order(amount).await {
        Ok(order) => Ok(Json(order)),
        Err(ServiceError::ValidationError(_)) => Err(ApiError::storefront(
            StatusCode::BAD_REQUEST,
            StorefrontErrorBody::error(MSG_INVALID_AMOUNT),
        )),
        Err(e) => {
            error!(error = %e, amount, "Error creating gateway order");
            Err(ApiError::storefront(
                StatusCode::INTERNAL_SERVER_ERROR,
                StorefrontErrorBody::error(MSG_CREATE_FAILED),
            ))
        }
    }
}
