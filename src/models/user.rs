use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

/// Storefront account. Keyed by normalized e-mail, or by a `tg_`/`phone_`
/// surrogate for accounts created through Telegram or phone login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,
    /// Chat the bot may write to; absent until the user links Telegram
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_id: Option<String>,
    #[serde(default)]
    pub spins: u32,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub wishlist: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new_with_email(email: &str) -> Self {
        let email = super::normalize_email(email);
        Self {
            id: email.clone(),
            email: Some(email),
            phone: None,
            name: None,
            password_hash: None,
            telegram_id: None,
            telegram_chat_id: None,
            oauth_provider: None,
            oauth_id: None,
            spins: 0,
            role: Role::Customer,
            email_verified: false,
            wishlist: Vec::new(),
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Public view without credentials.
    pub fn profile(&self) -> Value {
        let mut profile = serde_json::json!({
            "id": self.id,
            "email": self.email,
            "phone": self.phone,
            "name": self.name,
            "spins": self.spins,
            "role": self.role,
            "emailVerified": self.email_verified,
            "telegramLinked": self.telegram_chat_id.is_some(),
        });
        if let Some(obj) = profile.as_object_mut() {
            obj.retain(|_, v| !v.is_null());
        }
        profile
    }
}
