//! TCP server
//!
//! Accepts connections, runs the protocol handshake and hands each connection
//! to [`run_connection`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shared::message::{
    BusMessage, EventType, HandshakeAck, HandshakePayload, PROTOCOL_VERSION, ResponsePayload,
};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use super::bus::MessageBus;
use super::connection::run_connection;
use super::transport::{TcpTransport, Transport};
use crate::security_log;
use crate::utils::{AppError, ErrorCode};

/// Delay before closing after a handshake error, so the client can read it
const HANDSHAKE_ERROR_DELAY_MS: u64 = 100;

impl MessageBus {
    /// Bind the configured address and serve until shutdown
    pub async fn start_tcp_server(&self) -> Result<(), AppError> {
        let listener = TcpListener::bind(&self.config.tcp_listen_addr)
            .await
            .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", self.config.tcp_listen_addr, e)))?;

        tracing::info!(
            "Message bus TCP server listening on {}",
            self.config.tcp_listen_addr
        );
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), AppError> {
        loop {
            tokio::select! {
                _ = self.shutdown_token().cancelled() => {
                    tracing::info!("Message bus TCP server shutting down");
                    break;
                }
                result = listener.accept() => match result {
                    Ok((stream, addr)) => {
                        tracing::debug!("Client connected: {}", addr);
                        self.spawn_client_handler(stream, addr);
                    }
                    Err(e) => tracing::error!("Failed to accept connection: {}", e),
                }
            }
        }
        Ok(())
    }

    fn spawn_client_handler(&self, stream: TcpStream, addr: SocketAddr) {
        let bus = self.clone();
        tokio::spawn(async move {
            let transport: Arc<dyn Transport> = Arc::new(TcpTransport::from_stream(stream));

            let handshake = tokio::time::timeout(
                bus.config.handshake_timeout,
                perform_handshake(transport.as_ref(), addr),
            )
            .await
            .unwrap_or_else(|_| {
                Err(AppError::with_message(ErrorCode::TimeoutError, "Handshake timed out"))
            });

            match handshake {
                Ok(conn_id) => {
                    run_connection(
                        bus.hub.clone(),
                        transport,
                        conn_id,
                        bus.config.outbound_capacity,
                        bus.shutdown_token().clone(),
                    )
                    .await;
                }
                Err(e) => {
                    tracing::debug!("Client {} handshake failed: {}", addr, e);
                    let _ = transport.close().await;
                }
            }
        });
    }
}

/// Validate the first frame and answer it. Returns the connection id.
async fn perform_handshake(transport: &dyn Transport, addr: SocketAddr) -> Result<String, AppError> {
    let msg = transport.read_message().await?;

    if msg.event_type != EventType::Handshake {
        security_log!(WARN, "handshake_missing", peer = %addr, event_type = %msg.event_type);
        send_handshake_error(transport, &msg, "Expected handshake", ErrorCode::InvalidRequest).await;
        return Err(AppError::invalid("Expected Handshake message"));
    }

    let payload: HandshakePayload = match msg.parse_payload() {
        Ok(payload) => payload,
        Err(e) => {
            send_handshake_error(transport, &msg, "Invalid handshake payload", ErrorCode::InvalidFormat).await;
            return Err(AppError::invalid_format(format!("Invalid handshake payload: {}", e)));
        }
    };

    if payload.version != PROTOCOL_VERSION {
        tracing::warn!(
            "Client {} protocol version mismatch: expected {}, got {}",
            addr,
            PROTOCOL_VERSION,
            payload.version
        );
        send_handshake_error(
            transport,
            &msg,
            &format!(
                "Protocol version mismatch: server={}, client={}. Please update your client.",
                PROTOCOL_VERSION, payload.version
            ),
            ErrorCode::ProtocolMismatch,
        )
        .await;
        return Err(AppError::new(ErrorCode::ProtocolMismatch));
    }

    let client_id = payload
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::info!(
        peer = %addr,
        conn_id = %client_id,
        client_name = ?payload.client_name,
        client_version = ?payload.client_version,
        "Handshake accepted"
    );

    let ack = HandshakeAck {
        client_id: client_id.clone(),
    };
    let response = ResponsePayload::success(
        format!("Connected as client: {}", client_id),
        serde_json::to_value(&ack).ok(),
    );
    transport
        .write_message(&BusMessage::reply_to(&msg, &response))
        .await?;

    Ok(client_id)
}

async fn send_handshake_error(
    transport: &dyn Transport,
    msg: &BusMessage,
    message: &str,
    code: ErrorCode,
) {
    let response = BusMessage::reply_to(msg, &ResponsePayload::error(message, code));
    if let Err(e) = transport.write_message(&response).await {
        tracing::debug!("Failed to send handshake error: {}", e);
    }
    tokio::time::sleep(Duration::from_millis(HANDSHAKE_ERROR_DELAY_MS)).await;
}
