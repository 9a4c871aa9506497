//! Per-connection pump
//!
//! Shared by every transport once the connection has an id:
//!
//! ```text
//! transport.read ──Inbound──▶ Hub
//! transport.write ◀── writer task ◀── outbound queue ◀── Hub (try_send)
//! ```
//!
//! `Connect` is sent before the first `Inbound`, and `Disconnect` exactly
//! once when either side stops.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::transport::{Transport, is_protocol_error};
use crate::hub::{ConnectionId, HubHandle};
use crate::security_log;
use crate::utils::ErrorCode;
use shared::message::BusMessage;

pub async fn run_connection(
    hub: HubHandle,
    transport: Arc<dyn Transport>,
    conn_id: ConnectionId,
    outbound_capacity: usize,
    shutdown: CancellationToken,
) {
    let session = Uuid::new_v4();
    let (outbound, rx) = mpsc::channel(outbound_capacity);

    if let Err(e) = hub
        .connect(conn_id.clone(), session, transport.peer_addr(), outbound)
        .await
    {
        tracing::warn!(conn_id = %conn_id, "Order hub unavailable, closing connection: {}", e);
        let _ = transport.close().await;
        return;
    }

    let disconnect = shutdown.child_token();
    let writer = spawn_writer(transport.clone(), rx, conn_id.clone(), disconnect.clone());

    read_loop(&hub, transport.as_ref(), &conn_id, session, &disconnect).await;

    disconnect.cancel();
    drop(writer);
    if let Err(e) = hub.disconnect(conn_id.clone(), session).await {
        tracing::debug!(conn_id = %conn_id, "Disconnect not delivered: {}", e);
    }
    let _ = transport.close().await;
    tracing::debug!(conn_id = %conn_id, "Connection closed");
}

async fn read_loop(
    hub: &HubHandle,
    transport: &dyn Transport,
    conn_id: &str,
    session: Uuid,
    disconnect: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = disconnect.cancelled() => break,
            result = transport.read_message() => match result {
                Ok(mut msg) => {
                    msg.source = Some(conn_id.to_string());
                    if hub.inbound(conn_id.to_string(), session, msg).await.is_err() {
                        tracing::warn!(conn_id = %conn_id, "Order hub stopped, dropping connection");
                        break;
                    }
                }
                Err(e) if e.code == ErrorCode::ClientDisconnected => {
                    tracing::debug!(conn_id = %conn_id, "Peer closed connection");
                    break;
                }
                Err(e) if is_protocol_error(&e) => {
                    security_log!(WARN, "malformed_frame", conn_id = %conn_id, error = %e);
                    break;
                }
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, "Read failed: {}", e);
                    break;
                }
            }
        }
    }
}

/// Drain the outbound queue into the transport.
///
/// The queue closes when the hub drops this connection (e.g. replaced by a
/// reconnect with the same id); that ends the whole connection.
fn spawn_writer(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::Receiver<BusMessage>,
    conn_id: ConnectionId,
    disconnect: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = disconnect.cancelled() => break,
                next = rx.recv() => match next {
                    Some(msg) => {
                        if let Err(e) = transport.write_message(&msg).await {
                            tracing::debug!(conn_id = %conn_id, "Write failed: {}", e);
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(conn_id = %conn_id, "Outbound queue closed by hub");
                        break;
                    }
                }
            }
        }
        disconnect.cancel();
    })
}
