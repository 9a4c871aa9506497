//! Café order sync client
//!
//! Client side of the order hub:
//!
//! - [`MessageClient`] - connection, request/response correlation, event
//!   subscription
//! - [`Query`] / [`QueryHandle`] - subscribe-style reads with retry and polling
//! - [`Mutation`] - fire-once writes with retry
//! - [`OrderSync`] - typed order and catalog helpers

pub mod config;
pub mod error;
pub mod message;
pub mod sync;

pub use config::{MessageClientConfig, RetryPolicy};
pub use error::{MessageError, SyncError};
pub use message::{BusMessage, EventType, MessageClient};
pub use sync::{
    Mutation, OrderSync, Query, QueryHandle, QueryOptions, QueryState, RequestKey, Requester,
};
