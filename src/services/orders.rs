use crate::{
    errors::ServiceError,
    models::{
        normalize_email, DeliveryTracking, Order, OrderItem, OrderStatus, PaymentStatus, Product,
        ShippingAddress, User, WheelPrize,
    },
    store::{Collection, Store},
};
use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Checkout payload. Required fields are optional here so a missing one is
/// reported as a validation failure instead of a decoding failure.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(required, length(min = 1))]
    pub user_id: Option<String>,
    #[validate(required, length(min = 1))]
    #[schema(value_type = Vec<Object>)]
    pub items: Option<Vec<OrderItem>>,
    #[validate(required)]
    #[schema(value_type = Option<f64>)]
    pub total: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub subtotal: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub discount: Option<Decimal>,
    pub promo_code: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub shipping_address: ShippingAddress,
    pub delivery_service: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub delivery_info: Option<Value>,
    /// Anything else the checkout sent is kept on the order
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub success: bool,
    pub id: String,
    pub spins_added: u32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeliveryRequest {
    #[validate(length(min = 1, max = 128))]
    pub tracking_number: String,
    pub carrier: Option<String>,
    /// `shipped` (default) or `delivered`
    pub status: Option<String>,
}

/// Order intake and lookups.
#[derive(Clone)]
pub struct OrderService {
    store: Store,
    spin_threshold: u32,
}

/// `order_<unix-millis>_<9 lowercase alphanumerics>`
pub fn generate_order_id() -> String {
    format!(
        "order_{}_{}",
        Utc::now().timestamp_millis(),
        super::random_suffix(9)
    )
}

/// Whole spins earned for an order total.
pub fn spins_for_total(total: Decimal, threshold: u32) -> u32 {
    if threshold == 0 || total <= Decimal::ZERO {
        return 0;
    }
    (total / Decimal::from(threshold))
        .floor()
        .to_u32()
        .unwrap_or(0)
}

impl OrderService {
    pub fn new(store: Store, spin_threshold: u32) -> Self {
        Self {
            store,
            spin_threshold,
        }
    }

    /// Persists a pending order, then applies its side effects one by one.
    /// Once the order is stored a failing side effect is only logged.
    #[instrument(skip(self, request), fields(user_id = request.user_id.as_deref().unwrap_or("")))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|_| ServiceError::ValidationError("userId, items and total are required".into()))?;

        let CreateOrderRequest {
            user_id,
            items,
            total,
            subtotal,
            discount,
            promo_code,
            shipping_address,
            delivery_service,
            delivery_info,
            extra,
        } = request;
        let (Some(user_id), Some(items), Some(total)) = (user_id, items, total) else {
            return Err(ServiceError::ValidationError(
                "userId, items and total are required".into(),
            ));
        };

        let now = Utc::now();
        let order = Order {
            id: generate_order_id(),
            user_id,
            items,
            subtotal,
            discount,
            total,
            promo_code: promo_code
                .map(|code| code.trim().to_string())
                .filter(|code| !code.is_empty()),
            shipping_address,
            delivery_service,
            delivery_info,
            tracking: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            invoice_id: None,
            payment_signature: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            extra,
        };

        self.store.put(Collection::Orders, &order.id, &order).await?;
        info!(order_id = %order.id, total = %order.total, items = order.items.len(), "Order created");

        for item in &order.items {
            self.decrement_stock(&order.id, item).await;
        }

        let spins_added = self.accrue_spins(&order).await;

        if let Some(code) = order.promo_code.as_deref() {
            self.redeem_prize(&order.id, code).await;
        }

        Ok(CreateOrderResponse {
            success: true,
            id: order.id,
            spins_added,
        })
    }

    /// Read-then-write stock update; concurrent orders may both succeed.
    async fn decrement_stock(&self, order_id: &str, item: &OrderItem) {
        let product = match self
            .store
            .get::<Product>(Collection::Products, &item.product_id)
            .await
        {
            Ok(Some(product)) => product,
            Ok(None) => {
                warn!(order_id, product_id = %item.product_id, "Product not found, stock unchanged");
                return;
            }
            Err(e) => {
                warn!(order_id, product_id = %item.product_id, error = %e, "Failed to load product for stock update");
                return;
            }
        };

        let mut updated = product;
        updated.stock = updated.stock_after(item.quantity);
        match self
            .store
            .put(Collection::Products, &updated.id, &updated)
            .await
        {
            Ok(()) => debug!(order_id, product_id = %updated.id, stock = updated.stock, "Stock decremented"),
            Err(e) => {
                warn!(order_id, product_id = %updated.id, error = %e, "Failed to write product stock")
            }
        }
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, ServiceError> {
        if let Some(user) = self.store.get::<User>(Collection::Users, user_id).await? {
            return Ok(Some(user));
        }
        let normalized = normalize_email(user_id);
        if normalized != user_id {
            return Ok(self.store.get::<User>(Collection::Users, &normalized).await?);
        }
        Ok(None)
    }

    async fn accrue_spins(&self, order: &Order) -> u32 {
        let spins = spins_for_total(order.total, self.spin_threshold);
        if spins == 0 {
            return 0;
        }

        let mut user = match self.find_user(&order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(order_id = %order.id, user_id = %order.user_id, "User not found, no spins awarded");
                return 0;
            }
            Err(e) => {
                warn!(order_id = %order.id, user_id = %order.user_id, error = %e, "Failed to load user for spins");
                return 0;
            }
        };

        user.spins = user.spins.saturating_add(spins);
        match self.store.put(Collection::Users, &user.id, &user).await {
            Ok(()) => {
                info!(order_id = %order.id, user_id = %user.id, spins, total_spins = user.spins, "Spins awarded");
                spins
            }
            Err(e) => {
                warn!(order_id = %order.id, user_id = %user.id, error = %e, "Failed to save awarded spins");
                0
            }
        }
    }

    async fn redeem_prize(&self, order_id: &str, code: &str) {
        let prizes = match self
            .store
            .scan::<WheelPrize>(Collection::WheelPrizes)
            .await
        {
            Ok(prizes) => prizes,
            Err(e) => {
                warn!(order_id, error = %e, "Failed to scan wheel prizes");
                return;
            }
        };

        let Some(mut prize) = prizes
            .into_iter()
            .find(|prize| prize.matches_code(code) && !prize.used)
        else {
            debug!(order_id, promo_code = code, "No unused wheel prize for promo code");
            return;
        };

        prize.redeem(order_id, Utc::now());
        match self
            .store
            .put(Collection::WheelPrizes, &prize.id, &prize)
            .await
        {
            Ok(()) => info!(order_id, prize_id = %prize.id, "Wheel prize redeemed"),
            Err(e) => warn!(order_id, prize_id = %prize.id, error = %e, "Failed to mark wheel prize used"),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.store
            .get::<Order>(Collection::Orders, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    /// Attaches carrier tracking and moves the order to shipped or delivered.
    #[instrument(skip(self, request), fields(tracking_number = %request.tracking_number))]
    pub async fn update_delivery(
        &self,
        order_id: &str,
        request: UpdateDeliveryRequest,
    ) -> Result<Order, ServiceError> {
        request.validate()?;

        let status = match request.status.as_deref().map(str::trim) {
            None | Some("") => OrderStatus::Shipped,
            Some(raw) => match raw.to_ascii_lowercase().parse::<OrderStatus>() {
                Ok(status @ (OrderStatus::Shipped | OrderStatus::Delivered)) => status,
                _ => {
                    return Err(ServiceError::ValidationError(format!(
                        "Unsupported delivery status: {raw}"
                    )))
                }
            },
        };

        let mut order = self.get_order(order_id).await?;
        match order.status {
            OrderStatus::Cancelled => {
                return Err(ServiceError::Conflict(format!(
                    "Order {order_id} is cancelled"
                )))
            }
            OrderStatus::Pending if !order.is_paid() => {
                return Err(ServiceError::Conflict(format!(
                    "Order {order_id} is awaiting payment"
                )))
            }
            _ => {}
        }

        let now = Utc::now();
        order.tracking = Some(DeliveryTracking {
            tracking_number: request.tracking_number.trim().to_string(),
            carrier: request
                .carrier
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            updated_at: now,
        });
        let old_status = order.status;
        order.status = status;
        order.updated_at = now;

        self.store.put(Collection::Orders, &order.id, &order).await?;
        info!(order_id = %order.id, old_status = %old_status, new_status = %order.status, "Delivery updated");
        Ok(order)
    }
}
