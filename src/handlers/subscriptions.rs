use super::common::{success_response, JsonBody};
use crate::{
    errors::{ErrorResponse, ServiceError},
    services::subscriptions::{SubscribeRequest, SubscribeResponse},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

#[utoipa::path(
    post,
    path = "/api/newsletter/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = SubscribeResponse),
        (status = 400, description = "Invalid e-mail", body = ErrorResponse)
    ),
    tag = "Subscriptions"
)]
pub async fn subscribe_newsletter(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SubscribeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .subscriptions
        .subscribe_newsletter(payload)
        .await?;
    Ok(success_response(response))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/notify",
    params(("id" = String, Path, description = "Product id")),
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Notified or subscribed", body = SubscribeResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    ),
    tag = "Subscriptions"
)]
pub async fn notify_back_in_stock(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    JsonBody(payload): JsonBody<SubscribeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .subscriptions
        .notify_back_in_stock(&product_id, payload)
        .await?;
    Ok(success_response(response))
}
