use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::models::ConnectionCounts;
use crate::order::types::string_or_number;
use crate::order::{
    DEFAULT_PAYMENT_METHOD, OrderId, OrderItem, OrderSnapshot, OrderStatus, compute_total,
};

// ==================== Client -> Hub ====================

/// Handshake payload (client -> hub)
///
/// Carries the client's protocol version so the hub can reject
/// incompatible peers before any order traffic flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    /// Protocol version
    pub version: u16,
    /// Client name / label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Client build version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    /// Stable client id; becomes the connection id when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Role registration (client -> hub)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    /// Claimed role; unknown values register as guest
    pub role: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
}

/// Order submission (client -> hub)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderPayload {
    /// Id assigned by the persistence layer; the hub generates one when absent
    #[serde(default, alias = "orderId", skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,
    pub items: Vec<OrderItem>,
    /// Explicit total; computed from the items when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub customer_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub staff_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl NewOrderPayload {
    /// Build the initial `pending` snapshot
    pub fn into_snapshot(self, order_id: OrderId, now: i64) -> OrderSnapshot {
        let total = self.total.unwrap_or_else(|| compute_total(&self.items));
        OrderSnapshot {
            order_id,
            items: self.items,
            total,
            payment_method: self
                .payment_method
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            status: OrderStatus::Pending,
            note: self.note,
            customer_id: self.customer_id,
            staff_id: self.staff_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status change request (client -> hub)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusPayload {
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Status lookup (client -> hub)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOrderStatusPayload {
    pub order_id: OrderId,
}

/// Catalog / settings read delegated to the persistence layer
///
/// # Examples
/// - `resource`: "products", `params`: `{ "categoryId": 3 }`
/// - `resource`: "settings"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

// ==================== Hub -> Client ====================

/// Generic response payload (hub -> requesting client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    /// Whether the request succeeded
    pub success: bool,
    /// Human readable message / error description
    pub message: String,
    /// Response data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error code, only set on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ResponsePayload {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>, error_code: ErrorCode) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(error_code),
        }
    }

    /// Parse `data` into a typed value
    pub fn parse_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone().unwrap_or(serde_json::Value::Null))
    }
}

impl From<&AppError> for ResponsePayload {
    fn from(err: &AppError) -> Self {
        let mut payload = Self::error(err.message.clone(), err.code);
        if let Some(details) = &err.details {
            payload.data = serde_json::to_value(details).ok();
        }
        payload
    }
}

/// Handshake acknowledgement data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAck {
    pub client_id: String,
}

/// `newOrder` acknowledgement data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderAck {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// `updateOrderStatus` acknowledgement data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateAck {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub previous_status: OrderStatus,
    /// `false` when the order was already in the requested status
    pub changed: bool,
}

/// `checkOrderStatus` result data
///
/// Not-found is a normal result: it usually means the order was completed
/// and already evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderLookup {
    Found { order: OrderSnapshot },
    Missing { error: bool, message: String },
}

impl OrderLookup {
    pub fn missing(order_id: OrderId) -> Self {
        OrderLookup::Missing {
            error: true,
            message: format!("Order {} not found", order_id),
        }
    }

    pub fn into_order(self) -> Option<OrderSnapshot> {
        match self {
            OrderLookup::Found { order } => Some(order),
            OrderLookup::Missing { .. } => None,
        }
    }
}

/// Admin summary of a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderNotification {
    pub order_id: OrderId,
    pub total: f64,
    pub item_count: i64,
    pub payment_method: String,
    pub created_at: i64,
}

impl From<&OrderSnapshot> for NewOrderNotification {
    fn from(order: &OrderSnapshot) -> Self {
        Self {
            order_id: order.order_id,
            total: order.total,
            item_count: order.item_count(),
            payment_method: order.payment_method.clone(),
            created_at: order.created_at,
        }
    }
}

/// Status change broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdated {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub previous_status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub updated_at: i64,
}

/// Order evicted from the live backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRemoved {
    pub order_id: OrderId,
}

/// Per-role connection counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connections: ConnectionCounts,
}

/// Live orders sent to a newly registered staff/kitchen/admin connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBacklog {
    pub orders: Vec<OrderSnapshot>,
}
