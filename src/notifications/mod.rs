//! Best-effort notification fan-out over e-mail and Telegram.
//!
//! Each channel is independent: a failure is logged and dropped, never
//! retried and never reported back to the request that triggered it.

mod email;
mod telegram;
pub mod templates;

pub use email::{EmailMessage, EmailSender, HttpEmailSender};
pub use telegram::{ChatNotifier, TelegramNotifier};
pub use templates::{order_paid_chat_message, EmailTemplate, RenderedEmail, TemplateKind};

use crate::{
    config::AppConfig,
    models::{normalize_email, Order, User},
    store::{Collection, Store},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected request with status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("{0} channel is not configured")]
    NotConfigured(&'static str),
}

/// Routes domain events to the configured channels.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Store,
    email: Option<Arc<dyn EmailSender>>,
    chat: Option<Arc<dyn ChatNotifier>>,
    owner_email: Option<String>,
    owner_chat_id: Option<i64>,
    site_url: String,
}

impl NotificationDispatcher {
    /// Dispatcher with no channels; every send is skipped.
    pub fn new(store: Store, site_url: impl Into<String>) -> Self {
        Self {
            store,
            email: None,
            chat: None,
            owner_email: None,
            owner_chat_id: None,
            site_url: site_url.into(),
        }
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>, owner_email: Option<String>) -> Self {
        self.email = Some(sender);
        self.owner_email = owner_email.filter(|e| !e.trim().is_empty());
        self
    }

    pub fn with_chat(mut self, notifier: Arc<dyn ChatNotifier>, owner_chat_id: Option<i64>) -> Self {
        self.chat = Some(notifier);
        self.owner_chat_id = owner_chat_id;
        self
    }

    /// Wires the HTTP channels whose credentials are present.
    pub fn from_config(config: &AppConfig, store: Store) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        let mut dispatcher = Self::new(store, config.site_url.clone());

        match config.email.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                let sender = HttpEmailSender::new(
                    client.clone(),
                    config.email.api_url.clone(),
                    key,
                    config.email.from.clone(),
                );
                dispatcher = dispatcher.with_email(Arc::new(sender), config.email.owner_email.clone());
            }
            None => info!("E-mail API key not set; e-mail notifications disabled"),
        }

        match config.telegram.bot_token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                let bot = TelegramNotifier::new(client, config.telegram.api_url.clone(), token);
                dispatcher = dispatcher.with_chat(Arc::new(bot), config.telegram.owner_chat_id);
            }
            None => info!("Telegram bot token not set; chat notifications disabled"),
        }

        Ok(dispatcher)
    }

    pub fn email_enabled(&self) -> bool {
        self.email.is_some()
    }

    /// Renders and sends one e-mail, returning the channel outcome.
    pub async fn send_email(&self, to: &str, template: &EmailTemplate) -> Result<(), NotificationError> {
        let sender = self.email.as_ref().ok_or(NotificationError::NotConfigured("email"))?;
        let rendered = template.render(&self.site_url);
        sender
            .send(&EmailMessage {
                to: to.to_string(),
                subject: rendered.subject,
                html: rendered.html,
                text: rendered.text,
            })
            .await
    }

    async fn deliver_email(&self, to: &str, template: &EmailTemplate) {
        let kind = template.kind();
        match self.send_email(to, template).await {
            Ok(()) => info!(template = %kind, to, "E-mail sent"),
            Err(NotificationError::NotConfigured(channel)) => {
                debug!(template = %kind, channel, "Skipping e-mail, channel not configured")
            }
            Err(e) => warn!(template = %kind, to, error = %e, "E-mail delivery failed"),
        }
    }

    async fn deliver_chat(&self, chat_id: i64, text: &str, audience: &'static str) {
        let Some(chat) = self.chat.as_ref() else {
            debug!(audience, "Skipping chat message, channel not configured");
            return;
        };
        match chat.send_message(chat_id, text).await {
            Ok(()) => info!(audience, chat_id, "Chat message sent"),
            Err(e) => warn!(audience, chat_id, error = %e, "Chat delivery failed"),
        }
    }

    /// Sends an e-mail on a background task.
    pub fn spawn_email(&self, to: String, template: EmailTemplate) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.deliver_email(&to, &template).await })
    }

    async fn load_customer(&self, user_id: &str) -> Option<User> {
        let lookup = match self.store.get::<User>(Collection::Users, user_id).await {
            Ok(None) => {
                self.store
                    .get::<User>(Collection::Users, &normalize_email(user_id))
                    .await
            }
            other => other,
        };
        match lookup {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load customer for notifications");
                None
            }
        }
    }

    /// Fans a paid order out to the customer and the shop owner.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn notify_order_paid(&self, order: &Order) {
        let customer = self.load_customer(&order.user_id).await;

        let customer_email = order
            .contact_email()
            .map(str::to_string)
            .or_else(|| customer.as_ref().and_then(|u| u.email.clone()));
        match customer_email {
            Some(to) => {
                let template = EmailTemplate::OrderConfirmation {
                    order: order.clone(),
                    for_owner: false,
                };
                self.deliver_email(&to, &template).await;
            }
            None => debug!("No customer e-mail for order"),
        }

        if let Some(owner) = self.owner_email.as_deref() {
            let template = EmailTemplate::OrderConfirmation {
                order: order.clone(),
                for_owner: true,
            };
            self.deliver_email(owner, &template).await;
        }

        if let Some(owner_chat) = self.owner_chat_id {
            self.deliver_chat(owner_chat, &order_paid_chat_message(order, true), "owner")
                .await;
        }

        if let Some(chat_id) = customer.as_ref().and_then(|u| u.telegram_chat_id) {
            self.deliver_chat(chat_id, &order_paid_chat_message(order, false), "customer")
                .await;
        }
    }

    /// Runs [`Self::notify_order_paid`] detached from the caller.
    pub fn spawn_order_paid(&self, order: Order) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.notify_order_paid(&order).await })
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("email", &self.email.is_some())
            .field("chat", &self.chat.is_some())
            .field("owner_chat_id", &self.owner_chat_id)
            .finish()
    }
}
