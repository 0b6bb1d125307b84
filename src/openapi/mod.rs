use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sweet Delights API",
        version = "0.3.0",
        description = r#"
# Sweet Delights storefront API

Order intake, Robokassa payments, promo codes, the loyalty wheel and
customer accounts for the Sweet Delights confectionery shop.

## Authentication

Account endpoints return a session token. Send it as:

```
Authorization: Bearer <token>
```

## Errors

Failures use one envelope:

```json
{
  "error": "Bad Request",
  "message": "Validation error: userId, items and total are required",
  "requestId": "2f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
"#
    ),
    tags(
        (name = "Orders", description = "Order intake and delivery tracking"),
        (name = "Payments", description = "Payment initiation and provider callbacks"),
        (name = "Promotions", description = "Promo code validation"),
        (name = "Auth", description = "Accounts and session tokens"),
        (name = "Wishlist", description = "Customer wishlists"),
        (name = "Loyalty", description = "Loyalty wheel"),
        (name = "Subscriptions", description = "Newsletter and back-in-stock alerts")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_delivery,
        crate::handlers::payments::init_payment,
        crate::handlers::payments::payment_callback,
        crate::handlers::promotions::validate_promo,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,
        crate::handlers::auth::link_telegram,
        crate::handlers::wishlist::get_wishlist,
        crate::handlers::wishlist::update_wishlist,
        crate::handlers::wheel::spin,
        crate::handlers::wheel::list_prizes,
        crate::handlers::subscriptions::subscribe_newsletter,
        crate::handlers::subscriptions::notify_back_in_stock,
    ),
    components(
        schemas(
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::CreateOrderResponse,
            crate::services::orders::UpdateDeliveryRequest,
            crate::services::payments::PaymentInitRequest,
            crate::services::payments::PaymentInitResponse,
            crate::services::promotions::ValidatePromoRequest,
            crate::services::promotions::PromoValidation,
            crate::services::promotions::PromoSummary,
            crate::services::users::RegisterRequest,
            crate::services::users::RegisterResponse,
            crate::services::users::LoginRequest,
            crate::services::users::AuthResponse,
            crate::services::users::TelegramLinkRequest,
            crate::services::wishlist::WishlistUpdateRequest,
            crate::services::wishlist::WishlistResponse,
            crate::services::wheel::SpinResponse,
            crate::services::subscriptions::SubscribeRequest,
            crate::services::subscriptions::SubscribeResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
