//! Request/subscribe layer
//!
//! ```text
//! Query ──┐                     ┌── attempt 1 ── fail ── sleep(delay)
//!         ├── execute(key) ─────┼── attempt 2 ── fail ── sleep(delay)
//! Mutation┘                     └── attempt 3 ── fail ── RetriesExhausted
//! ```
//!
//! Every attempt sends a fresh frame (new `request_id`). A failure is a
//! transport error, a timeout or `success: false` from the hub. Cancellation
//! is checked before each attempt and interrupts the pause between attempts.

pub mod mutation;
pub mod orders;
pub mod query;

pub use mutation::Mutation;
pub use orders::OrderSync;
pub use query::{Query, QueryHandle, QueryOptions, QueryState};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use shared::message::{BusMessage, EventType, ResponsePayload};
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::SyncError;
use crate::message::MessageClient;

/// Anything that can answer a request with a [`ResponsePayload`]
#[async_trait]
pub trait Requester: Send + Sync {
    async fn request(&self, msg: BusMessage) -> Result<ResponsePayload, SyncError>;
}

#[async_trait]
impl Requester for MessageClient {
    async fn request(&self, msg: BusMessage) -> Result<ResponsePayload, SyncError> {
        Ok(self.request_payload(&msg).await?)
    }
}

/// Identity of a request: event name plus serialized payload
///
/// Rebuilt into a new [`BusMessage`] for every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    event: EventType,
    payload: String,
}

impl RequestKey {
    pub fn new<T: Serialize + ?Sized>(event: EventType, payload: &T) -> Result<Self, SyncError> {
        Ok(Self {
            event,
            payload: serde_json::to_string(payload)?,
        })
    }

    pub fn event(&self) -> EventType {
        self.event
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Fresh frame for one attempt
    pub fn message(&self) -> BusMessage {
        BusMessage::new(self.event, self.payload.as_bytes().to_vec())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event, self.payload)
    }
}

fn check_success(response: ResponsePayload) -> Result<ResponsePayload, SyncError> {
    if response.success {
        Ok(response)
    } else {
        Err(SyncError::Server {
            code: response.error_code,
            message: response.message,
        })
    }
}

/// Run `key` under `policy` until it succeeds, attempts run out, or
/// `cancel` fires
pub(crate) async fn execute(
    requester: &dyn Requester,
    key: &RequestKey,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ResponsePayload, SyncError> {
    let attempts = policy.max_attempts.max(1);
    let mut last = SyncError::Cancelled;

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = requester.request(key.message()) => result,
        };
        match result.and_then(check_success) {
            Ok(response) => return Ok(response),
            Err(e) => {
                tracing::debug!(key = %key, attempt, error = %e, "Request attempt failed");
                last = e;
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }
    }

    tracing::warn!(key = %key, attempts, error = %last, "Request failed, retries exhausted");
    Err(SyncError::RetriesExhausted {
        attempts,
        last: Box::new(last),
    })
}
