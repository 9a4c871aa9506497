//! Message bus types
//!
//! Shared between `sync-hub` and its clients for both in-process (memory)
//! and network (TCP) communication.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

pub mod frame;
pub mod payload;
pub use frame::{FRAME_HEADER_LEN, FrameError, FrameHeader, MAX_PAYLOAD_LEN};
pub use payload::*;

/// Protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Bus event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Protocol handshake (client -> hub)
    Handshake = 0,
    /// Role registration (client -> hub)
    Register = 1,
    /// Order submission (client -> hub) and new-order broadcast (hub -> staff, kitchen)
    NewOrder = 2,
    /// Status change request (client -> hub)
    UpdateOrderStatus = 3,
    /// Status lookup (client -> hub)
    CheckOrderStatus = 4,
    /// Catalog / settings read (client -> hub)
    Query = 5,
    /// Correlated reply (hub -> requesting client)
    Response = 6,
    /// Admin summary of a new order
    NewOrderNotification = 7,
    /// Status change broadcast
    OrderStatusUpdated = 8,
    /// Order evicted from the live backlog
    OrderRemoved = 9,
    /// Per-role connection counts
    ConnectionStatus = 10,
    /// Live orders unicast to a registering staff/kitchen/admin connection
    OrderBacklog = 11,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::Handshake,
        EventType::Register,
        EventType::NewOrder,
        EventType::UpdateOrderStatus,
        EventType::CheckOrderStatus,
        EventType::Query,
        EventType::Response,
        EventType::NewOrderNotification,
        EventType::OrderStatusUpdated,
        EventType::OrderRemoved,
        EventType::ConnectionStatus,
        EventType::OrderBacklog,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Handshake => "handshake",
            EventType::Register => "register",
            EventType::NewOrder => "newOrder",
            EventType::UpdateOrderStatus => "updateOrderStatus",
            EventType::CheckOrderStatus => "checkOrderStatus",
            EventType::Query => "query",
            EventType::Response => "response",
            EventType::NewOrderNotification => "newOrderNotification",
            EventType::OrderStatusUpdated => "orderStatusUpdated",
            EventType::OrderRemoved => "orderRemoved",
            EventType::ConnectionStatus => "connectionStatus",
            EventType::OrderBacklog => "orderBacklog",
        }
    }

    /// Events a client may send to the hub after the handshake
    pub fn is_client_request(&self) -> bool {
        matches!(
            self,
            EventType::Register
                | EventType::NewOrder
                | EventType::UpdateOrderStatus
                | EventType::CheckOrderStatus
                | EventType::Query
        )
    }
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        EventType::ALL
            .iter()
            .copied()
            .find(|e| *e as u8 == value)
            .ok_or(())
    }
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message bus envelope
///
/// `source` and `target` are routing hints inside the hub process and are
/// never written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub request_id: Uuid,
    pub event_type: EventType,
    pub source: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub target: Option<String>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            source: None,
            correlation_id: None,
            target: None,
            payload,
        }
    }

    /// Build a message from any serializable payload
    pub fn json<T: Serialize + ?Sized>(
        event_type: EventType,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_vec(payload)?))
    }

    /// Set the target connection
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// Set the correlation id (RPC reply)
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Typed constructor for payloads owned by this crate.
    ///
    /// These are plain structs of strings, numbers and JSON values, so
    /// serialization cannot fail.
    fn typed<T: Serialize>(event_type: EventType, payload: &T) -> Self {
        let bytes = serde_json::to_vec(payload).unwrap_or_else(|_| b"null".to_vec());
        Self::new(event_type, bytes)
    }

    pub fn handshake(payload: &HandshakePayload) -> Self {
        Self::typed(EventType::Handshake, payload)
    }

    pub fn register(payload: &RegisterPayload) -> Self {
        Self::typed(EventType::Register, payload)
    }

    pub fn new_order(payload: &NewOrderPayload) -> Self {
        Self::typed(EventType::NewOrder, payload)
    }

    pub fn update_order_status(payload: &UpdateOrderStatusPayload) -> Self {
        Self::typed(EventType::UpdateOrderStatus, payload)
    }

    pub fn check_order_status(payload: &CheckOrderStatusPayload) -> Self {
        Self::typed(EventType::CheckOrderStatus, payload)
    }

    pub fn query(payload: &QueryPayload) -> Self {
        Self::typed(EventType::Query, payload)
    }

    pub fn response(payload: &ResponsePayload) -> Self {
        Self::typed(EventType::Response, payload)
    }

    /// Reply correlated to `request`
    pub fn reply_to(request: &BusMessage, payload: &ResponsePayload) -> Self {
        Self::response(payload).with_correlation_id(request.request_id)
    }

    pub fn order_snapshot(snapshot: &crate::order::OrderSnapshot) -> Self {
        Self::typed(EventType::NewOrder, snapshot)
    }

    pub fn new_order_notification(payload: &NewOrderNotification) -> Self {
        Self::typed(EventType::NewOrderNotification, payload)
    }

    pub fn order_status_updated(payload: &OrderStatusUpdated) -> Self {
        Self::typed(EventType::OrderStatusUpdated, payload)
    }

    pub fn order_removed(payload: &OrderRemoved) -> Self {
        Self::typed(EventType::OrderRemoved, payload)
    }

    pub fn connection_status(payload: &ConnectionStatus) -> Self {
        Self::typed(EventType::ConnectionStatus, payload)
    }

    pub fn order_backlog(payload: &OrderBacklog) -> Self {
        Self::typed(EventType::OrderBacklog, payload)
    }

    /// Parse the payload into the given type
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn is_response(&self) -> bool {
        matches!(self.event_type, EventType::Response)
    }
}
