use super::common::{created_response, success_response, JsonBody};
use crate::{
    auth::AuthUser,
    errors::{ErrorResponse, ServiceError},
    services::users::{
        AuthResponse, LoginRequest, RegisterRequest, RegisterResponse, TelegramLinkRequest,
    },
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/telegram/link", post(link_telegram))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Verification code sent", body = RegisterResponse),
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or code", body = ErrorResponse),
        (status = 409, description = "E-mail already registered", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let tokens = state.token_service()?;
    match state.services.users.register(payload, tokens).await? {
        response @ RegisterResponse::VerificationSent { .. } => Ok(success_response(response)),
        RegisterResponse::Registered(auth) => Ok(created_response(auth)),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let tokens = state.token_service()?;
    Ok(success_response(state.services.users.login(payload, tokens).await?))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current profile"),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state.services.users.profile(&user.user_id).await?;
    Ok(success_response(json!({ "success": true, "user": profile })))
}

#[utoipa::path(
    post,
    path = "/api/auth/telegram/link",
    request_body = TelegramLinkRequest,
    responses(
        (status = 200, description = "Chat linked"),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn link_telegram(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<TelegramLinkRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state
        .services
        .users
        .link_telegram(&user.user_id, payload.chat_id, payload.telegram_id)
        .await?;
    Ok(success_response(json!({ "success": true, "user": profile })))
}
