use super::common::{success_response, JsonBody};
use crate::{
    errors::{ErrorResponse, ServiceError},
    services::wishlist::{WishlistResponse, WishlistUpdateRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};

pub fn wishlist_routes() -> Router<AppState> {
    Router::new().route("/:user_id", get(get_wishlist).post(update_wishlist))
}

#[utoipa::path(
    get,
    path = "/api/wishlist/{userId}",
    params(("userId" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Wishlist items", body = WishlistResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Wishlist"
)]
pub async fn get_wishlist(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.wishlist.items(&user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/wishlist/{userId}",
    params(("userId" = String, Path, description = "User id")),
    request_body = WishlistUpdateRequest,
    responses(
        (status = 200, description = "Updated wishlist", body = WishlistResponse),
        (status = 400, description = "Unknown action", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Wishlist"
)]
pub async fn update_wishlist(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    JsonBody(payload): JsonBody<WishlistUpdateRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.wishlist.update(&user_id, payload).await?;
    Ok(success_response(response))
}
