use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionKind {
    Newsletter,
    BackInStock,
}

/// Write-only from this service: restock mailings that read back-in-stock
/// records run outside the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub kind: SubscriptionKind,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn key(kind: SubscriptionKind, email: &str, product_id: Option<&str>) -> String {
        match product_id {
            Some(product) => format!("{kind}:{email}:{product}"),
            None => format!("{kind}:{email}"),
        }
    }
}
