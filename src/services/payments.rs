use super::payment_gateway::{PaymentGateway, PaymentRequest, ShopParams, ORDER_ID_PARAM};
use crate::{
    config::PaymentConfig,
    errors::ServiceError,
    models::{Order, OrderStatus, PaymentStatus},
    notifications::NotificationDispatcher,
    store::{Collection, Store},
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitRequest {
    #[serde(default)]
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitResponse {
    pub success: bool,
    pub payment_url: String,
    pub invoice_id: i64,
}

/// Fields of a provider result callback, as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub out_sum: String,
    pub inv_id: String,
    pub signature: String,
    pub shop_params: ShopParams,
}

impl PaymentCallback {
    /// Builds a callback from raw request fields. Field names are matched
    /// case-insensitively; every `Shp_` field is kept for verification.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ServiceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out_sum = None;
        let mut inv_id = None;
        let mut signature = None;
        let mut shop_params = ShopParams::new();

        for (key, value) in params {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            if key.eq_ignore_ascii_case("OutSum") {
                out_sum = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("InvId") {
                inv_id = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("SignatureValue") {
                signature = Some(value.to_string());
            } else {
                shop_params.insert(key, value);
            }
        }

        let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());
        let mut missing = Vec::new();
        if !present(&out_sum) {
            missing.push("OutSum");
        }
        if !present(&inv_id) {
            missing.push("InvId");
        }
        if !present(&signature) {
            missing.push("SignatureValue");
        }
        if shop_params.get(ORDER_ID_PARAM).map_or(true, str::is_empty) {
            missing.push(ORDER_ID_PARAM);
        }
        if !missing.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "Missing callback fields: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            out_sum: out_sum.unwrap_or_default(),
            inv_id: inv_id.unwrap_or_default(),
            signature: signature.unwrap_or_default(),
            shop_params,
        })
    }

    pub fn order_id(&self) -> Option<&str> {
        self.shop_params.get(ORDER_ID_PARAM).map(str::trim)
    }
}

/// Result of processing a verified callback.
#[derive(Debug)]
pub struct CallbackOutcome {
    /// `OK{InvId}` acknowledgement expected by the provider
    pub acknowledgement: String,
    pub order: Order,
    /// Fan-out task, absent when the order had already been paid
    pub notification: Option<JoinHandle<()>>,
}

/// Payment initiation and callback processing.
#[derive(Clone)]
pub struct PaymentService {
    store: Store,
    config: PaymentConfig,
    notifier: NotificationDispatcher,
}

impl PaymentService {
    pub fn new(store: Store, config: PaymentConfig, notifier: NotificationDispatcher) -> Self {
        Self {
            store,
            config,
            notifier,
        }
    }

    fn gateway(&self) -> Result<PaymentGateway, ServiceError> {
        PaymentGateway::from_config(&self.config).map_err(|e| {
            warn!(error = %e, "Payment gateway is not configured");
            e
        })
    }

    async fn load_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.store
            .get::<Order>(Collection::Orders, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    /// Assigns an invoice id to a pending order and returns the signed URL.
    #[instrument(skip(self))]
    pub async fn initiate(&self, order_id: &str) -> Result<PaymentInitResponse, ServiceError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ServiceError::ValidationError("orderId is required".into()));
        }
        let gateway = self.gateway()?;
        let mut order = self.load_order(order_id).await?;
        if order.is_paid() {
            return Err(ServiceError::Conflict(format!("Order {order_id} is already paid")));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::Conflict(format!("Order {order_id} is cancelled")));
        }
        if order.total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError("Order total must be positive".into()));
        }

        let invoice_id = i64::from(rand::thread_rng().gen_range(1..=i32::MAX));
        let payment_url = gateway.build_payment_url(&PaymentRequest {
            amount: order.total,
            invoice_id,
            description: format!("{} {}", self.config.description, order.id),
            email: order.contact_email().map(str::to_string),
            shop_params: ShopParams::new().with(ORDER_ID_PARAM, order.id.clone()),
        })?;

        order.invoice_id = Some(invoice_id);
        order.updated_at = Utc::now();
        self.store.put(Collection::Orders, &order.id, &order).await?;

        info!(order_id = %order.id, invoice_id, "Payment initiated");
        Ok(PaymentInitResponse {
            success: true,
            payment_url,
            invoice_id,
        })
    }

    /// Verifies a result callback and marks the order paid. A repeated
    /// callback for a paid order is acknowledged without side effects.
    #[instrument(skip(self, callback), fields(inv_id = %callback.inv_id))]
    pub async fn handle_callback(
        &self,
        callback: PaymentCallback,
    ) -> Result<CallbackOutcome, ServiceError> {
        let gateway = self.gateway()?;
        if !gateway.verify_callback(
            &callback.out_sum,
            &callback.inv_id,
            &callback.signature,
            &callback.shop_params,
        ) {
            warn!(out_sum = %callback.out_sum, "Rejected payment callback with invalid signature");
            return Err(ServiceError::InvalidSignature(
                "Payment signature mismatch".into(),
            ));
        }

        let order_id = callback
            .order_id()
            .ok_or_else(|| ServiceError::BadRequest(format!("{ORDER_ID_PARAM} is required")))?
            .to_string();
        let mut order = self.load_order(&order_id).await?;
        let acknowledgement = format!("OK{}", callback.inv_id);

        if order.is_paid() {
            info!(order_id = %order.id, "Payment callback repeated for paid order");
            return Ok(CallbackOutcome {
                acknowledgement,
                order,
                notification: None,
            });
        }

        match Decimal::from_str(&callback.out_sum) {
            Ok(amount) if amount != order.total => warn!(
                order_id = %order.id,
                paid = %amount,
                expected = %order.total,
                "Paid amount differs from order total"
            ),
            Ok(_) => {}
            Err(_) => warn!(order_id = %order.id, out_sum = %callback.out_sum, "Unparseable OutSum"),
        }
        if let (Some(expected), Ok(received)) = (order.invoice_id, callback.inv_id.parse::<i64>()) {
            if expected != received {
                warn!(order_id = %order.id, expected, received, "Invoice id differs from the one issued");
            }
        }

        let now = Utc::now();
        order.payment_status = PaymentStatus::Paid;
        order.status = OrderStatus::Processing;
        order.paid_at = Some(now);
        order.updated_at = now;
        order.payment_signature = Some(callback.signature.clone());
        if order.invoice_id.is_none() {
            order.invoice_id = callback.inv_id.parse().ok();
        }
        self.store.put(Collection::Orders, &order.id, &order).await?;
        info!(order_id = %order.id, total = %order.total, "Order paid");

        let notification = self.notifier.spawn_order_paid(order.clone());
        Ok(CallbackOutcome {
            acknowledgement,
            order,
            notification: Some(notification),
        })
    }
}
