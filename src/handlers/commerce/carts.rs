use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{
    auth::AuthUser, errors::ApiError, services::commerce::cart_service::SetCartItemInput,
    AppState,
};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

/// Creates the router for the caller's cart
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/items", post(set_cart_item))
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .get_cart(&user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Set one line's quantity; zero removes it
async fn set_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SetCartItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .carts
        .set_item(&user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}
