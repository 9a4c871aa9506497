use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use shared::message::{
    BusMessage, HandshakeAck, HandshakePayload, PROTOCOL_VERSION, RegisterPayload,
    ResponsePayload,
};
use shared::models::Role;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::transport::{MemoryTransport, TcpTransport, Transport};
use crate::config::MessageClientConfig;
use crate::error::MessageError;

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<BusMessage>>>>;

/// Message Client
///
/// One connection to the order hub. Supports request/response (correlated by
/// `request_id`) and event subscription. Cheap to clone; all clones share the
/// connection.
#[derive(Debug, Clone)]
pub struct MessageClient {
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<BusMessage>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    client_id: Arc<RwLock<Option<String>>>,
    config: MessageClientConfig,
    reader: CancellationToken,
}

impl MessageClient {
    /// Connect via TCP and complete the protocol handshake
    pub async fn connect(addr: &str, client_name: &str) -> Result<Self, MessageError> {
        Self::connect_with_config(addr, client_name, MessageClientConfig::default()).await
    }

    pub async fn connect_with_config(
        addr: &str,
        client_name: &str,
        config: MessageClientConfig,
    ) -> Result<Self, MessageError> {
        let transport = TcpTransport::connect(addr).await?;
        let client = Self::new(Arc::new(transport), config);

        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some(client_name.to_string()),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            client_id: client.config.client_id.clone(),
        };
        let response = match client.request_payload(&BusMessage::handshake(&payload)).await {
            Ok(response) => response,
            Err(e) => {
                let _ = client.close().await;
                return Err(e);
            }
        };
        if !response.success {
            let _ = client.close().await;
            return Err(MessageError::Connection(format!(
                "Handshake rejected: {}",
                response.message
            )));
        }

        if let Ok(ack) = response.parse_data::<HandshakeAck>() {
            tracing::debug!(client_id = %ack.client_id, "Handshake accepted");
            *client.client_id.write() = Some(ack.client_id);
        }
        Ok(client)
    }

    /// In-process client over the hub's `(to_server, from_server)` pair
    pub fn memory(to_server: mpsc::Sender<BusMessage>, from_server: mpsc::Receiver<BusMessage>) -> Self {
        Self::memory_with_config(to_server, from_server, MessageClientConfig::default())
    }

    pub fn memory_with_config(
        to_server: mpsc::Sender<BusMessage>,
        from_server: mpsc::Receiver<BusMessage>,
        config: MessageClientConfig,
    ) -> Self {
        Self::new(Arc::new(MemoryTransport::new(to_server, from_server)), config)
    }

    fn new(transport: Arc<dyn Transport>, config: MessageClientConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let client = Self {
            transport,
            event_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
            client_id: Arc::new(RwLock::new(None)),
            config,
            reader: CancellationToken::new(),
        };
        client.spawn_reader();
        client
    }

    /// Dispatch loop: complete pending requests, then re-broadcast everything
    fn spawn_reader(&self) {
        let transport = self.transport.clone();
        let event_tx = self.event_tx.clone();
        let pending = self.pending.clone();
        let connected = self.connected.clone();
        let stop = self.reader.clone();

        tokio::spawn(async move {
            loop {
                let result = tokio::select! {
                    _ = stop.cancelled() => break,
                    result = transport.read_message() => result,
                };
                match result {
                    Ok(msg) => {
                        if let Some(correlation_id) = msg.correlation_id
                            && let Some(tx) = pending.lock().remove(&correlation_id)
                        {
                            let _ = tx.send(msg.clone());
                        }
                        if event_tx.send(msg).is_err() {
                            tracing::trace!("No subscribers for event");
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Transport read error: {}", e);
                        break;
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);
            // Dropping the senders fails every waiting request
            let failed = {
                let mut pending = pending.lock();
                let n = pending.len();
                pending.clear();
                n
            };
            if failed > 0 {
                tracing::warn!(failed, "Connection lost with requests in flight");
            }
        });
    }

    pub fn config(&self) -> &MessageClientConfig {
        &self.config
    }

    /// Id assigned by the hub during the handshake (TCP only)
    pub fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Every message received from the hub, including responses
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.event_tx.subscribe()
    }

    /// Send a message (fire and forget)
    pub async fn send(&self, msg: &BusMessage) -> Result<(), MessageError> {
        if !self.is_connected() {
            return Err(MessageError::Connection("Not connected".into()));
        }
        self.transport.write_message(msg).await
    }

    /// Send `msg` and wait for the response correlated to its `request_id`
    pub async fn request(&self, msg: &BusMessage) -> Result<BusMessage, MessageError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(msg.request_id, tx);
        // Entry goes away on every exit, including the caller dropping this future
        let _entry = PendingEntry {
            pending: &self.pending,
            request_id: msg.request_id,
        };

        self.send(msg).await?;

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(MessageError::Connection("Connection closed before response".into())),
            Err(_) => Err(MessageError::Timeout(format!(
                "No response to {} within {:?}",
                msg.event_type, self.config.request_timeout
            ))),
        }
    }

    /// [`request`](Self::request) and decode the [`ResponsePayload`]
    pub async fn request_payload(&self, msg: &BusMessage) -> Result<ResponsePayload, MessageError> {
        let response = self.request(msg).await?;
        response
            .parse_payload()
            .map_err(|e| MessageError::InvalidMessage(format!("Invalid response payload: {}", e)))
    }

    /// Join a role group. The hub does not answer `register`.
    pub async fn register(&self, role: Role, user_id: Option<String>) -> Result<(), MessageError> {
        let payload = RegisterPayload {
            role: role.as_str().to_string(),
            user_id,
        };
        self.send(&BusMessage::register(&payload)).await
    }

    pub async fn close(&self) -> Result<(), MessageError> {
        self.connected.store(false, Ordering::SeqCst);
        self.reader.cancel();
        self.transport.close().await
    }
}

/// Removes a request's pending slot when dropped
struct PendingEntry<'a> {
    pending: &'a PendingMap,
    request_id: Uuid,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
    }
}
