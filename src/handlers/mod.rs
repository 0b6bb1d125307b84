pub mod auth;
pub mod common;
pub mod orders;
pub mod payments;
pub mod promotions;
pub mod subscriptions;
pub mod wheel;
pub mod wishlist;

use crate::{
    config::AppConfig,
    notifications::NotificationDispatcher,
    services::{
        orders::OrderService, payments::PaymentService, promotions::PromoService,
        subscriptions::SubscriptionService, users::UserService, wheel::WheelService,
        wishlist::WishlistService,
    },
    store::Store,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub promotions: Arc<PromoService>,
    pub users: Arc<UserService>,
    pub wishlist: Arc<WishlistService>,
    pub wheel: Arc<WheelService>,
    pub subscriptions: Arc<SubscriptionService>,
}

impl AppServices {
    pub fn new(store: Store, config: &AppConfig, notifier: NotificationDispatcher) -> Self {
        Self {
            orders: Arc::new(OrderService::new(store.clone(), config.spin_threshold)),
            payments: Arc::new(PaymentService::new(
                store.clone(),
                config.payment.clone(),
                notifier.clone(),
            )),
            promotions: Arc::new(PromoService::new(store.clone())),
            users: Arc::new(UserService::new(
                store.clone(),
                notifier.clone(),
                config.verification_code_ttl_secs,
            )),
            wishlist: Arc::new(WishlistService::new(store.clone())),
            wheel: Arc::new(WheelService::new(store.clone())),
            subscriptions: Arc::new(SubscriptionService::new(store, notifier)),
        }
    }
}
