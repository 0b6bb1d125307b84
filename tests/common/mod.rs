#![allow(dead_code)]

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sweet_delights_api::{
    app_router,
    auth::hash_password,
    config::AppConfig,
    models::{DiscountType, Product, PromoCode, Role, User},
    notifications::NotificationDispatcher,
    services::payment_gateway::{HashAlgorithm, PaymentGateway, ShopParams, ORDER_ID_PARAM},
    store::{Collection, Store},
    AppState,
};
use tower::ServiceExt;

pub const MERCHANT: &str = "sweet-test";
pub const PASSWORD1: &str = "test-pass-one";
pub const PASSWORD2: &str = "test-pass-two";
pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Configuration with payment and session secrets set and no outbound channels.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new("127.0.0.1".to_string(), 18_080, "test".to_string());
    cfg.store_backend = "memory".to_string();
    cfg.jwt_secret = Some(JWT_SECRET.to_string());
    cfg.payment.merchant_login = Some(MERCHANT.to_string());
    cfg.payment.password1 = Some(PASSWORD1.to_string());
    cfg.payment.password2 = Some(PASSWORD2.to_string());
    cfg.payment.test_mode = true;
    cfg.http_timeout_secs = 2;
    cfg
}

/// Router over an in-memory store, driven with `oneshot`.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Store,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        let store = Store::in_memory();
        let notifier = NotificationDispatcher::from_config(&cfg, store.clone())
            .expect("failed to build notifier");
        let state = AppState::new(cfg, store.clone(), notifier);
        Self {
            router: app_router(state.clone()),
            state,
            store,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    /// Request with a raw body and content type (form callbacks).
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        content_type: &str,
        body: impl Into<Body>,
    ) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type)
            .body(body.into())
            .expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub fn token_for(&self, user_id: &str) -> String {
        self.state
            .token_service()
            .expect("jwt secret configured")
            .issue(user_id, Some(user_id))
            .expect("failed to issue token")
    }

    pub async fn seed_product(&self, id: &str, price: Decimal, stock: i64) -> Product {
        let product = Product {
            id: id.to_string(),
            name: id.to_string(),
            price,
            sale_price: None,
            stock,
            category_id: None,
            extra: Map::new(),
        };
        self.store
            .put(Collection::Products, id, &product)
            .await
            .expect("seed product");
        product
    }

    pub async fn product(&self, id: &str) -> Product {
        self.store
            .get(Collection::Products, id)
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn seed_user(&self, email: &str, spins: u32) -> User {
        let mut user = User::new_with_email(email);
        user.spins = spins;
        user.password_hash = Some(hash_password("sweet123").expect("hash"));
        self.store
            .put(Collection::Users, &user.id, &user)
            .await
            .expect("seed user");
        user
    }

    /// Stores an account with the admin role and returns a session token for it.
    pub async fn seed_admin(&self, email: &str) -> String {
        let mut user = User::new_with_email(email);
        user.role = Role::Admin;
        self.store
            .put(Collection::Users, &user.id, &user)
            .await
            .expect("seed admin");
        self.token_for(&user.id)
    }

    pub async fn user(&self, id: &str) -> User {
        self.store
            .get(Collection::Users, id)
            .await
            .expect("load user")
            .expect("user exists")
    }

    pub async fn seed_promo(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        min_order_amount: Option<Decimal>,
        max_uses: Option<u32>,
    ) -> PromoCode {
        let promo = PromoCode {
            code: code.to_uppercase(),
            discount_type,
            discount_value: value,
            start_date: Some(Utc::now() - chrono::Duration::days(1)),
            end_date: None,
            max_uses,
            min_order_amount,
            is_active: true,
            description: None,
        };
        self.store
            .put(Collection::PromoCodes, &promo.code, &promo)
            .await
            .expect("seed promo");
        promo
    }

    pub async fn count(&self, collection: Collection) -> usize {
        self.store
            .scan::<Value>(collection)
            .await
            .expect("scan collection")
            .len()
    }
}

/// Gateway with the same secrets as [`test_config`], used to sign callbacks
/// the way the provider would.
pub fn provider_gateway() -> PaymentGateway {
    PaymentGateway::new(MERCHANT, PASSWORD1, PASSWORD2, HashAlgorithm::Sha256)
}

/// Form-encoded callback body signed with password2.
pub fn signed_callback_form(out_sum: &str, inv_id: &str, order_id: &str) -> String {
    let shop = ShopParams::new().with(ORDER_ID_PARAM, order_id);
    let signature = provider_gateway().result_signature(out_sum, inv_id, &shop);
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("OutSum", out_sum)
        .append_pair("InvId", inv_id)
        .append_pair("SignatureValue", &signature.to_uppercase())
        .append_pair(ORDER_ID_PARAM, order_id)
        .finish()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
