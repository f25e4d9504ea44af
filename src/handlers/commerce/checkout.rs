use crate::handlers::common::{created_response, map_service_error, success_response};
use crate::{
    auth::AuthUser,
    errors::{ApiError, ServiceError},
    services::commerce::checkout_service::{PaymentResult, PlaceOrderInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(place_order))
        .route("/checkout/:checkout_id/payment", post(payment_result))
        .route("/checkout-success", get(checkout_success))
}

/// Place an order from the caller's stored cart
async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let placed = state
        .services
        .checkout
        .place_order(&user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(placed))
}

/// Apply the gateway widget's result to a prepaid checkout
async fn payment_result(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkout_id): Path<String>,
    Json(payload): Json<PaymentResult>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .checkout
        .handle_payment_result(&user.user_id, &checkout_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(outcome))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSuccessQuery {
    pub checkout_id: Option<String>,
}

/// Success page: finalize if the payment landed but the order is not yet paid
async fn checkout_success(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CheckoutSuccessQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let checkout_id = query
        .checkout_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServiceError::ValidationError("checkout_id is required".into()))?;

    let outcome = state
        .services
        .checkout
        .confirm_success(&user.user_id, &checkout_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(outcome))
}
