use super::common::{created_response, success_response, JsonBody};
use crate::{
    auth::AuthUser,
    errors::{ErrorResponse, ServiceError},
    services::orders::{CreateOrderRequest, CreateOrderResponse, UpdateDeliveryRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/delivery", put(update_delivery))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Missing userId, items or total", body = ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.orders.create_order(payload).await?;
    Ok(created_response(response))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order document"),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(&id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/delivery",
    params(("id" = String, Path, description = "Order id")),
    request_body = UpdateDeliveryRequest,
    responses(
        (status = 200, description = "Tracking stored"),
        (status = 400, description = "Invalid tracking data", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is unpaid or cancelled", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateDeliveryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.users.require_admin(&user.user_id).await?;
    let order = state.services.orders.update_delivery(&id, payload).await?;
    Ok(success_response(order))
}
