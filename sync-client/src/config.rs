//! Client configuration

use std::time::Duration;

/// Retry behaviour shared by queries and mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Message client configuration
#[derive(Debug, Clone)]
pub struct MessageClientConfig {
    /// Time to wait for a correlated response
    pub request_timeout: Duration,
    /// Default retry policy for [`OrderSync`](crate::OrderSync)
    pub retry: RetryPolicy,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    /// Reconnect under this id (handshake `clientId`)
    pub client_id: Option<String>,
}

impl Default for MessageClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            event_capacity: 1024,
            client_id: None,
        }
    }
}

impl MessageClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}
