use super::common::success_response;
use crate::{
    auth::AuthUser,
    errors::{ErrorResponse, ServiceError},
    services::wheel::SpinResponse,
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;

pub fn wheel_routes() -> Router<AppState> {
    Router::new()
        .route("/spin", post(spin))
        .route("/prizes", get(list_prizes))
}

#[utoipa::path(
    post,
    path = "/api/wheel/spin",
    responses(
        (status = 200, description = "Prize won", body = SpinResponse),
        (status = 400, description = "No spins left", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Loyalty"
)]
pub async fn spin(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.wheel.spin(&user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/wheel/prizes",
    responses(
        (status = 200, description = "Prizes won by the caller"),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Loyalty"
)]
pub async fn list_prizes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let prizes = state.services.wheel.prizes(&user.user_id).await?;
    Ok(success_response(json!({ "success": true, "prizes": prizes })))
}
