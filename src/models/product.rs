use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Images, descriptions and other catalogue data owned by the admin tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Price a customer pays today.
    pub fn effective_price(&self) -> Decimal {
        match self.sale_price {
            Some(sale) if sale > Decimal::ZERO && sale < self.price => sale,
            _ => self.price,
        }
    }

    /// Stock left after selling `quantity`, clamped at zero.
    pub fn stock_after(&self, quantity: u32) -> i64 {
        (self.stock - i64::from(quantity)).max(0)
    }
}
