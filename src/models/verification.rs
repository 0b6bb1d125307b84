use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pending e-mail registration awaiting its six-digit code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCode {
    pub email: String,
    pub code: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl VerificationCode {
    pub const MAX_ATTEMPTS: u32 = 5;

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
