//! In-process transport
//!
//! Carries [`BusMessage`] values over a pair of bounded channels with no
//! framing. Used for tests and for clients embedded in the hub process.

use async_trait::async_trait;
use shared::message::BusMessage;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::utils::AppError;

/// Server end of an in-process connection
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: Mutex<mpsc::Receiver<BusMessage>>,
    outbound: mpsc::Sender<BusMessage>,
    closed: CancellationToken,
}

impl MemoryTransport {
    /// Create a connected pair.
    ///
    /// Returns the server end plus the client's sender (client → server) and
    /// receiver (server → client).
    pub fn pair(
        capacity: usize,
    ) -> (Self, mpsc::Sender<BusMessage>, mpsc::Receiver<BusMessage>) {
        let (to_server, inbound) = mpsc::channel(capacity);
        let (outbound, from_server) = mpsc::channel(capacity);
        let transport = Self {
            inbound: Mutex::new(inbound),
            outbound,
            closed: CancellationToken::new(),
        };
        (transport, to_server, from_server)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> Result<BusMessage, AppError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(AppError::client_disconnected()),
            msg = inbound.recv() => msg.ok_or_else(AppError::client_disconnected),
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError> {
        if self.closed.is_cancelled() {
            return Err(AppError::client_disconnected());
        }
        self.outbound
            .send(msg.clone())
            .await
            .map_err(|_| AppError::client_disconnected())
    }

    async fn close(&self) -> Result<(), AppError> {
        self.closed.cancel();
        Ok(())
    }

    fn peer_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}
