use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reward won on the loyalty wheel, redeemable once through its promo code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelPrize {
    pub id: String,
    pub user_id: String,
    pub prize_name: String,
    pub promo_code: String,
    #[serde(default)]
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WheelPrize {
    pub fn matches_code(&self, code: &str) -> bool {
        self.promo_code.trim().eq_ignore_ascii_case(code.trim())
    }

    pub fn redeem(&mut self, order_id: &str, at: DateTime<Utc>) {
        self.used = true;
        self.used_at = Some(at);
        self.order_id = Some(order_id.to_string());
    }
}
