//! Message bus - transport front-end of the order hub
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐
//! │ TCP listener │   │ connect_memory │
//! └──────┬───────┘   └───────┬────────┘
//!        │ handshake         │
//!        ▼                   ▼
//!   run_connection (one task per connection)
//!        │  HubCommand
//!        ▼
//!       Hub
//! ```

use std::sync::Arc;
use std::time::Duration;

use shared::message::BusMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::connection::run_connection;
use super::transport::MemoryTransport;
use crate::hub::{ConnectionId, HubHandle};

/// Transport layer settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tcp_listen_addr: String,
    /// Per-connection outbound queue capacity
    pub outbound_capacity: usize,
    /// Time a new TCP peer has to send its handshake
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tcp_listen_addr: "0.0.0.0:8081".to_string(),
            outbound_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageBus {
    pub(crate) hub: HubHandle,
    pub(crate) config: TransportConfig,
    shutdown_token: CancellationToken,
}

impl MessageBus {
    pub fn new(hub: HubHandle, config: TransportConfig) -> Self {
        Self {
            hub,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Stop accepting and close connections together with `token`
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Open an in-process connection with a generated id.
    ///
    /// Returns `(to_server, from_server)`. Dropping `to_server` disconnects.
    pub fn connect_memory(&self) -> (mpsc::Sender<BusMessage>, mpsc::Receiver<BusMessage>) {
        self.connect_memory_as(Uuid::new_v4().to_string())
    }

    /// Open an in-process connection under a caller-chosen id
    pub fn connect_memory_as(
        &self,
        conn_id: impl Into<ConnectionId>,
    ) -> (mpsc::Sender<BusMessage>, mpsc::Receiver<BusMessage>) {
        let capacity = self.config.outbound_capacity;
        let (transport, to_server, from_server) = MemoryTransport::pair(capacity);
        let conn_id = conn_id.into();
        tracing::debug!(conn_id = %conn_id, "Memory client connected");

        tokio::spawn(run_connection(
            self.hub.clone(),
            Arc::new(transport),
            conn_id,
            capacity,
            self.shutdown_token.clone(),
        ));
        (to_server, from_server)
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}
