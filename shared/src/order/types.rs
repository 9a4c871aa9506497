//! Order line items and identifiers

use serde::{Deserialize, Deserializer, Serialize};

/// Order identifier (database id or hub-assigned snowflake)
pub type OrderId = i64;

/// Default payment method when the client omits it
pub const DEFAULT_PAYMENT_METHOD: &str = "cash";

/// One ordered line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Unit price (accepts `price` as an alias)
    #[serde(default, alias = "price")]
    pub unit_price: f64,
    /// Selected options (size, milk, extra shot, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Sum of line totals, rounded to cents
pub fn compute_total(items: &[OrderItem]) -> f64 {
    let sum: f64 = items.iter().map(OrderItem::line_total).sum();
    (sum * 100.0).round() / 100.0
}

/// Accept ids sent either as JSON strings or numbers.
///
/// Browser clients send user ids in both shapes.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Str(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(n)) => Some(n.to_string()),
        None => None,
    })
}
