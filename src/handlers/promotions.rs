use super::common::{success_response, JsonBody};
use crate::{
    errors::{ErrorResponse, ServiceError},
    services::promotions::{PromoValidation, ValidatePromoRequest},
    AppState,
};
use axum::{extract::State, response::IntoResponse, routing::post, Router};

pub fn promo_routes() -> Router<AppState> {
    Router::new().route("/validate", post(validate_promo))
}

/// Unknown codes answer 200 with `valid: false`.
#[utoipa::path(
    post,
    path = "/api/promo/validate",
    request_body = ValidatePromoRequest,
    responses(
        (status = 200, description = "Validation result", body = PromoValidation),
        (status = 400, description = "Missing code or non-positive order total", body = ErrorResponse)
    ),
    tag = "Promotions"
)]
pub async fn validate_promo(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ValidatePromoRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .promotions
        .validate(&payload.code, payload.order_total)
        .await?;
    Ok(success_response(result))
}
