//! Sweet Delights storefront backend.
//!
//! HTTP API over a document store: order intake, Robokassa payment signing
//! and callbacks, promo codes, the loyalty wheel, accounts and best-effort
//! e-mail/Telegram notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod store;
pub mod tracing;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::{
    auth::TokenService,
    config::AppConfig,
    errors::ServiceError,
    handlers::AppServices,
    notifications::NotificationDispatcher,
    store::{Collection, Store},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<AppConfig>,
    pub notifier: NotificationDispatcher,
    pub services: AppServices,
    tokens: Option<TokenService>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store, notifier: NotificationDispatcher) -> Self {
        let services = AppServices::new(store.clone(), &config, notifier.clone());
        let tokens = TokenService::from_secret(config.jwt_secret.as_deref(), config.jwt_expiration);
        Self {
            store,
            config: Arc::new(config),
            notifier,
            services,
            tokens,
        }
    }

    /// Session token service; account endpoints fail closed without a secret.
    pub fn token_service(&self) -> Result<&TokenService, ServiceError> {
        self.tokens
            .as_ref()
            .ok_or_else(|| ServiceError::ConfigurationError("jwt_secret is not set".into()))
    }
}

/// Storefront API routes, mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/orders", handlers::orders::order_routes())
        .nest("/payments", handlers::payments::payment_routes())
        .nest("/promo", handlers::promotions::promo_routes())
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/wishlist", handlers::wishlist::wishlist_routes())
        .nest("/wheel", handlers::wheel::wheel_routes())
        .route(
            "/newsletter/subscribe",
            post(handlers::subscriptions::subscribe_newsletter),
        )
        .route(
            "/products/:id/notify",
            post(handlers::subscriptions::notify_back_in_stock),
        )
}

/// CORS from `cors_allowed_origins`; permissive when unset.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        if config.is_production() {
            ::tracing::warn!("APP__CORS_ALLOWED_ORIGINS is not set; allowing any origin");
        }
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Complete application: routes, request ids, HTTP tracing, CORS, timeout.
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api", api_routes())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(tracing::request_id_middleware))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state
        .store
        .get::<serde_json::Value>(Collection::Products, "__health__")
        .await
    {
        Ok(_) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "Store health check failed");
            "unhealthy"
        }
    };
    let status = if store_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status.is_success() { "ok" } else { "degraded" },
            "checks": {
                "store": store_status,
                "email": state.notifier.email_enabled(),
            },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}
