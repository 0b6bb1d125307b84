use crate::{
    errors::ServiceError,
    models::{normalize_email, Product, Subscription, SubscriptionKind},
    notifications::{EmailTemplate, NotificationDispatcher},
    store::{Collection, Store},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SubscribeRequest {
    #[serde(default)]
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
    /// True when the e-mail went out right away
    #[serde(default)]
    pub notified: bool,
}

/// Newsletter and back-in-stock subscriptions.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Store,
    notifier: NotificationDispatcher,
}

impl SubscriptionService {
    pub fn new(store: Store, notifier: NotificationDispatcher) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self, request))]
    pub async fn subscribe_newsletter(
        &self,
        request: SubscribeRequest,
    ) -> Result<SubscribeResponse, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let key = Subscription::key(SubscriptionKind::Newsletter, &email, None);

        if self
            .store
            .get::<Subscription>(Collection::Subscriptions, &key)
            .await?
            .is_some()
        {
            return Ok(SubscribeResponse {
                success: true,
                message: "Already subscribed".into(),
                notified: false,
            });
        }

        let subscription = Subscription {
            id: key.clone(),
            kind: SubscriptionKind::Newsletter,
            email: email.clone(),
            product_id: None,
            created_at: Utc::now(),
        };
        self.store
            .put(Collection::Subscriptions, &key, &subscription)
            .await?;
        self.notifier.spawn_email(
            email.clone(),
            EmailTemplate::Newsletter {
                email: email.clone(),
            },
        );

        info!(email = %email, "Newsletter subscription stored");
        Ok(SubscribeResponse {
            success: true,
            message: "Subscribed".into(),
            notified: self.notifier.email_enabled(),
        })
    }

    /// Notifies immediately when the product is in stock, otherwise records
    /// the request for later.
    #[instrument(skip(self, request))]
    pub async fn notify_back_in_stock(
        &self,
        product_id: &str,
        request: SubscribeRequest,
    ) -> Result<SubscribeResponse, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let product = self
            .store
            .get::<Product>(Collection::Products, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        if product.in_stock() {
            self.notifier
                .spawn_email(email.clone(), EmailTemplate::StockNotification { product });
            return Ok(SubscribeResponse {
                success: true,
                message: "Product is in stock".into(),
                notified: true,
            });
        }

        let key = Subscription::key(SubscriptionKind::BackInStock, &email, Some(product_id));
        let subscription = Subscription {
            id: key.clone(),
            kind: SubscriptionKind::BackInStock,
            email: email.clone(),
            product_id: Some(product_id.to_string()),
            created_at: Utc::now(),
        };
        self.store
            .put(Collection::Subscriptions, &key, &subscription)
            .await?;

        info!(email = %email, product_id, "Back-in-stock subscription stored");
        Ok(SubscribeResponse {
            success: true,
            message: "We will let you know when it is back".into(),
            notified: false,
        })
    }
}
