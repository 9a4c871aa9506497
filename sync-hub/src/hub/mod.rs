//! Order hub - single-owner actor for live orders and connections
//!
//! ```text
//!  TCP / memory connections
//!        │  HubCommand (mpsc)
//!        ▼
//! ┌──────────────────────────────────────┐
//! │ Hub (one task)                       │
//! │  ConnectionRegistry   OrderStore     │
//! │  EvictionTimer ──Evict──▶ (self)     │
//! └──────┬──────────────────────┬────────┘
//!        │ try_send             │ unbounded
//!        ▼                      ▼
//!  per-connection outbound   ArchiveWorker
//! ```
//!
//! Every registry and store mutation happens inside [`Hub::run`]; one command
//! is fully processed before the next one is received.

pub mod archive;
pub mod eviction;
pub mod registry;
pub mod router;
pub mod store;

pub use archive::{ArchiveWorker, JsonlArchive, OrderArchive};
pub use eviction::EvictionTimer;
pub use registry::{ConnectionRegistry, FanoutPolicy};
pub use router::Hub;
pub use store::OrderStore;

use std::time::Duration;

use shared::message::BusMessage;
use shared::models::ConnectionCounts;
use shared::order::{OrderId, OrderSnapshot};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::utils::{AppError, AppResult, ErrorCode};

/// Connection id (handshake `clientId` or a generated UUID)
pub type ConnectionId = String;

/// Outbound queue of one connection
pub type Outbound = mpsc::Sender<BusMessage>;

/// Hub behaviour knobs
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Delay between an order turning terminal and its eviction
    pub eviction_grace: Duration,
    /// Audience of `orderStatusUpdated`
    pub fanout: FanoutPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            eviction_grace: Duration::from_secs(60),
            fanout: FanoutPolicy::All,
        }
    }
}

/// Commands processed by the hub actor
#[derive(Debug)]
pub enum HubCommand {
    /// Transport finished its handshake
    Connect {
        conn_id: ConnectionId,
        /// Distinguishes a reconnect that reuses the same `conn_id`
        session: Uuid,
        peer: Option<String>,
        outbound: Outbound,
    },
    /// Frame received from a connection
    Inbound {
        conn_id: ConnectionId,
        /// Frames from a replaced session are dropped
        session: Uuid,
        msg: BusMessage,
    },
    /// Transport closed; sent exactly once per `Connect`
    Disconnect {
        conn_id: ConnectionId,
        session: Uuid,
    },
    /// Eviction grace elapsed
    Evict { order_id: OrderId },
    /// Live backlog snapshot
    Orders {
        reply: oneshot::Sender<Vec<OrderSnapshot>>,
    },
    /// Per-role connection counts
    Connections {
        reply: oneshot::Sender<ConnectionCounts>,
    },
}

/// Cloneable handle used by transports and HTTP handlers to reach the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Create the command channel feeding a [`Hub`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HubCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, cmd: HubCommand) -> AppResult<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| AppError::with_message(ErrorCode::ChannelClosed, "Order hub stopped"))
    }

    pub async fn connect(
        &self,
        conn_id: ConnectionId,
        session: Uuid,
        peer: Option<String>,
        outbound: Outbound,
    ) -> AppResult<()> {
        self.send(HubCommand::Connect {
            conn_id,
            session,
            peer,
            outbound,
        })
        .await
    }

    pub async fn inbound(
        &self,
        conn_id: ConnectionId,
        session: Uuid,
        msg: BusMessage,
    ) -> AppResult<()> {
        self.send(HubCommand::Inbound {
            conn_id,
            session,
            msg,
        })
        .await
    }

    pub async fn disconnect(&self, conn_id: ConnectionId, session: Uuid) -> AppResult<()> {
        self.send(HubCommand::Disconnect { conn_id, session }).await
    }

    /// Live orders ordered by creation time
    pub async fn orders(&self) -> AppResult<Vec<OrderSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Orders { reply }).await?;
        rx.await
            .map_err(|_| AppError::with_message(ErrorCode::ChannelClosed, "Order hub dropped request"))
    }

    pub async fn connections(&self) -> AppResult<ConnectionCounts> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connections { reply }).await?;
        rx.await
            .map_err(|_| AppError::with_message(ErrorCode::ChannelClosed, "Order hub dropped request"))
    }

    /// Weak sender for timers, so they never keep the hub alive
    pub(crate) fn downgrade(&self) -> mpsc::WeakSender<HubCommand> {
        self.tx.downgrade()
    }
}
