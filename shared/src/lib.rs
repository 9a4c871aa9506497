//! Shared types for the café order sync hub
//!
//! Wire types used by both `sync-hub` and `sync-client`: the framed
//! [`BusMessage`], event payloads, the order state machine and the unified
//! error types.

pub mod error;
pub mod message;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};

pub use models::Role;
pub use order::{OrderId, OrderSnapshot, OrderStatus};
