//! Hub actor - event routing and fan-out
//!
//! | Inbound | Effect | Outbound |
//! |---------|--------|----------|
//! | register | move role group | `connectionStatus` to all, `orderBacklog` to staff/kitchen/admin |
//! | newOrder | create `pending` snapshot | `newOrder` to staff+kitchen, `newOrderNotification` to admin, ack |
//! | updateOrderStatus | advance status | `orderStatusUpdated` to audience, ack; terminal ⇒ eviction + archive |
//! | checkOrderStatus | - | `{order}` or benign `{error, message}` |
//! | query | delegated to the catalog task | correlated response |
//!
//! A failing handler only answers the connection that sent the request; the
//! actor keeps running.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::message::{
    BusMessage, CheckOrderStatusPayload, ConnectionStatus, EventType, HandshakeAck,
    NewOrderAck, NewOrderNotification, NewOrderPayload, OrderBacklog, OrderLookup,
    OrderRemoved, OrderStatusUpdated, QueryPayload, RegisterPayload, ResponsePayload,
    StatusUpdateAck, UpdateOrderStatusPayload,
};
use shared::models::Role;
use shared::order::{OrderId, OrderSnapshot};
use shared::util::{now_millis, snowflake_id};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    ConnectionId, ConnectionRegistry, EvictionTimer, HubCommand, HubConfig, HubHandle,
    OrderStore, Outbound,
};
use crate::services::CatalogProvider;
use crate::utils::{AppError, AppResult, ErrorCode};
use crate::{audit_log, security_log};

pub struct Hub {
    config: HubConfig,
    registry: ConnectionRegistry,
    store: OrderStore,
    eviction: EvictionTimer,
    catalog: Arc<dyn CatalogProvider>,
    archive: Option<mpsc::UnboundedSender<OrderSnapshot>>,
}

fn parse<T: DeserializeOwned>(msg: &BusMessage) -> AppResult<T> {
    msg.parse_payload()
        .map_err(|e| AppError::invalid_format(format!("Invalid {} payload: {}", msg.event_type, e)))
}

fn data<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

impl Hub {
    pub fn new(config: HubConfig, handle: &HubHandle, catalog: Arc<dyn CatalogProvider>) -> Self {
        Self {
            eviction: EvictionTimer::new(config.eviction_grace, handle.downgrade()),
            config,
            registry: ConnectionRegistry::new(),
            store: OrderStore::new(),
            catalog,
            archive: None,
        }
    }

    /// Send terminal snapshots to an [`ArchiveWorker`](super::ArchiveWorker)
    pub fn with_archive(mut self, archive: mpsc::UnboundedSender<OrderSnapshot>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Build a hub and run it on a new task
    pub fn spawn(
        config: HubConfig,
        capacity: usize,
        catalog: Arc<dyn CatalogProvider>,
        archive: Option<mpsc::UnboundedSender<OrderSnapshot>>,
        shutdown: CancellationToken,
    ) -> (HubHandle, JoinHandle<()>) {
        let (handle, rx) = HubHandle::channel(capacity);
        let mut hub = Hub::new(config, &handle, catalog);
        if let Some(tx) = archive {
            hub = hub.with_archive(tx);
        }
        (handle, tokio::spawn(hub.run(rx, shutdown)))
    }

    /// Process commands until shutdown or until every handle is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>, shutdown: CancellationToken) {
        tracing::info!(
            grace_ms = self.config.eviction_grace.as_millis() as u64,
            fanout = %self.config.fanout,
            "Order hub started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Order hub shutting down");
                    break;
                }
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        tracing::info!("All hub handles dropped, order hub stopping");
                        break;
                    }
                }
            }
        }

        self.eviction.cancel_all();
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect {
                conn_id,
                session,
                peer,
                outbound,
            } => self.on_connect(conn_id, session, peer, outbound),
            HubCommand::Inbound {
                conn_id,
                session,
                msg,
            } => self.on_inbound(&conn_id, session, &msg),
            HubCommand::Disconnect { conn_id, session } => self.on_disconnect(&conn_id, session),
            HubCommand::Evict { order_id } => self.on_evict(order_id),
            HubCommand::Orders { reply } => {
                let _ = reply.send(self.store.all());
            }
            HubCommand::Connections { reply } => {
                let _ = reply.send(self.registry.counts());
            }
        }
    }

    // ========== Connection lifecycle ==========

    fn on_connect(
        &mut self,
        conn_id: ConnectionId,
        session: Uuid,
        peer: Option<String>,
        outbound: Outbound,
    ) {
        if self
            .registry
            .attach(conn_id.clone(), session, outbound, peer.clone())
            .is_some()
        {
            tracing::info!(conn_id = %conn_id, "Previous session replaced by reconnect");
        }
        tracing::info!(conn_id = %conn_id, peer = ?peer, total = self.registry.len(), "Connection attached");
        self.broadcast_connection_status();
    }

    fn on_disconnect(&mut self, conn_id: &str, session: Uuid) {
        match self.registry.unregister(conn_id, session) {
            Some(conn) => {
                tracing::info!(
                    conn_id = %conn_id,
                    role = %conn.role,
                    total = self.registry.len(),
                    "Connection detached"
                );
                self.broadcast_connection_status();
            }
            None => tracing::debug!(conn_id = %conn_id, "Stale disconnect ignored"),
        }
    }

    fn on_evict(&mut self, order_id: OrderId) {
        self.eviction.fired(order_id);
        let Some(order) = self.store.remove(order_id) else {
            return;
        };
        self.registry.drop_interest(order_id);
        tracing::info!(order_id, status = %order.status, live = self.store.len(), "Order evicted");
        self.broadcast(
            self.registry.all_members(),
            &BusMessage::order_removed(&OrderRemoved { order_id }),
        );
    }

    // ========== Inbound events ==========

    fn on_inbound(&mut self, conn_id: &str, session: Uuid, msg: &BusMessage) {
        match self.registry.get(conn_id) {
            None => {
                tracing::warn!(conn_id = %conn_id, event = %msg.event_type, "Message from unknown connection dropped");
                return;
            }
            // Frame still queued from a session that a reconnect replaced
            Some(conn) if conn.session != session => {
                tracing::debug!(conn_id = %conn_id, event = %msg.event_type, "Message from replaced session dropped");
                return;
            }
            Some(_) => {}
        }

        if let Err(err) = self.dispatch(conn_id, msg) {
            tracing::warn!(
                conn_id = %conn_id,
                event = %msg.event_type,
                code = %err.code,
                error = %err.message,
                "Request rejected"
            );
            self.reply(conn_id, msg, ResponsePayload::from(&err));
        }
    }

    fn dispatch(&mut self, conn_id: &str, msg: &BusMessage) -> AppResult<()> {
        match msg.event_type {
            EventType::Handshake => {
                let ack = HandshakeAck {
                    client_id: conn_id.to_string(),
                };
                self.reply(conn_id, msg, ResponsePayload::success("Already connected", data(&ack)));
                Ok(())
            }
            EventType::Register => self.handle_register(conn_id, msg),
            EventType::NewOrder => self.handle_new_order(conn_id, msg),
            EventType::UpdateOrderStatus => self.handle_update_status(conn_id, msg),
            EventType::CheckOrderStatus => self.handle_check_status(conn_id, msg),
            EventType::Query => self.handle_query(conn_id, msg),
            other => {
                security_log!(WARN, "server_event_from_client", conn_id = %conn_id, event_type = %other);
                Err(AppError::with_message(
                    ErrorCode::InvalidRequest,
                    format!("Event '{other}' cannot be sent by clients"),
                ))
            }
        }
    }

    fn handle_register(&mut self, conn_id: &str, msg: &BusMessage) -> AppResult<()> {
        let payload: RegisterPayload = parse(msg)?;
        let role = Role::parse(&payload.role);
        if role == Role::Guest && !payload.role.trim().eq_ignore_ascii_case("guest") {
            tracing::warn!(conn_id = %conn_id, requested = %payload.role, "Unknown role, registered as guest");
        }

        let Some(previous) = self
            .registry
            .register(conn_id, role, payload.user_id.clone())
        else {
            return Ok(());
        };
        tracing::info!(
            conn_id = %conn_id,
            role = %role,
            previous = %previous,
            user_id = ?payload.user_id,
            "Connection registered"
        );

        if previous != role {
            self.broadcast_connection_status();
        }
        if role.sees_backlog() {
            let backlog = OrderBacklog {
                orders: self.store.all(),
            };
            self.deliver(conn_id, BusMessage::order_backlog(&backlog));
        }
        Ok(())
    }

    fn handle_new_order(&mut self, conn_id: &str, msg: &BusMessage) -> AppResult<()> {
        let payload: NewOrderPayload = parse(msg)?;
        if payload.items.is_empty() {
            return Err(AppError::validation("Order must contain at least one item"));
        }
        if let Some(item) = payload.items.iter().find(|i| i.quantity <= 0) {
            return Err(AppError::validation(format!(
                "Item '{}' has invalid quantity {}",
                item.name, item.quantity
            )));
        }
        let order_id = payload.id.unwrap_or_else(snowflake_id);

        // Redelivery of an order that is already live: ack, no re-broadcast
        if let Some(existing) = self.store.get(order_id) {
            tracing::debug!(conn_id = %conn_id, order_id, "Duplicate newOrder acknowledged");
            let ack = NewOrderAck {
                order_id,
                status: existing.status,
            };
            self.reply(conn_id, msg, ResponsePayload::success("Order already received", data(&ack)));
            return Ok(());
        }

        let snapshot = payload.into_snapshot(order_id, now_millis());
        self.store.upsert(snapshot.clone());
        self.registry.add_interest(order_id, conn_id);
        tracing::info!(
            conn_id = %conn_id,
            order_id,
            total = snapshot.total,
            items = snapshot.items.len(),
            "New order received"
        );

        let mut floor: HashSet<ConnectionId> = self.registry.members_of(Role::Staff);
        floor.extend(self.registry.members_of(Role::Kitchen));
        self.broadcast(floor, &BusMessage::order_snapshot(&snapshot));
        self.broadcast(
            self.registry.members_of(Role::Admin),
            &BusMessage::new_order_notification(&NewOrderNotification::from(&snapshot)),
        );

        let ack = NewOrderAck {
            order_id,
            status: snapshot.status,
        };
        self.reply(conn_id, msg, ResponsePayload::success("Order received", data(&ack)));
        Ok(())
    }

    fn handle_update_status(&mut self, conn_id: &str, msg: &BusMessage) -> AppResult<()> {
        let payload: UpdateOrderStatusPayload = parse(msg)?;
        let order_id = payload.order_id;
        let next = payload.status;
        let previous = self
            .store
            .get(order_id)
            .map(|o| o.status)
            .ok_or_else(|| AppError::order_not_found(order_id))?;

        if !previous.accepts(next) {
            if previous.is_terminal() {
                return Err(AppError::with_message(
                    ErrorCode::OrderAlreadyTerminal,
                    format!("Order {order_id} is already {previous}"),
                ));
            }
            return Err(AppError::with_message(
                ErrorCode::InvalidStatusTransition,
                format!("Order {order_id} cannot move from {previous} to {next}"),
            )
            .with_detail("from", previous.as_str())
            .with_detail("to", next.as_str()));
        }
        // Already applied (e.g. a client retry): success without side effects
        if previous == next {
            let ack = StatusUpdateAck {
                order_id,
                status: next,
                previous_status: previous,
                changed: false,
            };
            self.reply(conn_id, msg, ResponsePayload::success("Status already applied", data(&ack)));
            return Ok(());
        }

        let updated_at = now_millis();
        let snapshot = {
            let order = self
                .store
                .get_mut(order_id)
                .ok_or_else(|| AppError::order_not_found(order_id))?;
            order.status = next;
            order.updated_at = updated_at;
            if payload.note.is_some() {
                order.note = payload.note.clone();
            }
            order.clone()
        };
        self.registry.add_interest(order_id, conn_id);
        tracing::info!(conn_id = %conn_id, order_id, from = %previous, to = %next, "Order status updated");

        let event = OrderStatusUpdated {
            order_id,
            status: next,
            previous_status: previous,
            note: payload.note,
            updated_at,
        };
        self.broadcast(
            self.registry.audience(order_id, self.config.fanout),
            &BusMessage::order_status_updated(&event),
        );

        let ack = StatusUpdateAck {
            order_id,
            status: next,
            previous_status: previous,
            changed: true,
        };
        self.reply(conn_id, msg, ResponsePayload::success("Status updated", data(&ack)));

        if next.is_terminal() {
            self.finalize(conn_id, snapshot);
        }
        Ok(())
    }

    /// Terminal order: arm eviction, hand off to the archive, audit
    fn finalize(&mut self, conn_id: &str, snapshot: OrderSnapshot) {
        let order_id = snapshot.order_id;
        self.eviction.schedule(order_id);

        audit_log!(
            conn_id,
            snapshot.status.as_str(),
            format!("order:{order_id}").as_str(),
            format!("total={:.2} payment={}", snapshot.total, snapshot.payment_method).as_str()
        );

        if let Some(archive) = &self.archive
            && archive.send(snapshot).is_err()
        {
            tracing::error!(order_id, "Archive channel closed, finalized order not archived");
        }
    }

    fn handle_check_status(&mut self, conn_id: &str, msg: &BusMessage) -> AppResult<()> {
        let payload: CheckOrderStatusPayload = parse(msg)?;
        let order_id = payload.order_id;

        let (message, lookup) = match self.store.get(order_id) {
            Some(order) => (
                "Order found",
                OrderLookup::Found {
                    order: order.clone(),
                },
            ),
            // Usually completed and already evicted
            None => ("Order not live", OrderLookup::missing(order_id)),
        };
        if matches!(lookup, OrderLookup::Found { .. }) {
            self.registry.add_interest(order_id, conn_id);
        }

        self.reply(conn_id, msg, ResponsePayload::success(message, data(&lookup)));
        Ok(())
    }

    /// Catalog reads run on their own task; the reply goes straight to the
    /// requesting connection's outbound queue.
    fn handle_query(&mut self, conn_id: &str, msg: &BusMessage) -> AppResult<()> {
        let payload: QueryPayload = parse(msg)?;
        let Some(outbound) = self.registry.get(conn_id).map(|c| c.outbound.clone()) else {
            return Ok(());
        };

        let catalog = Arc::clone(&self.catalog);
        let request_id = msg.request_id;
        let conn_id = conn_id.to_string();
        tokio::spawn(async move {
            let response = match catalog.fetch(&payload.resource, payload.params.as_ref()).await {
                Ok(value) => ResponsePayload::success(format!("{} loaded", payload.resource), Some(value)),
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, resource = %payload.resource, error = %e, "Catalog query failed");
                    ResponsePayload::from(&e)
                }
            };
            let reply = BusMessage::response(&response)
                .with_correlation_id(request_id)
                .with_target(&conn_id);
            if let Err(e) = outbound.try_send(reply) {
                tracing::warn!(conn_id = %conn_id, "Query reply dropped: {}", e);
            }
        });
        Ok(())
    }

    // ========== Delivery ==========

    fn reply(&self, conn_id: &str, request: &BusMessage, payload: ResponsePayload) {
        self.deliver(conn_id, BusMessage::reply_to(request, &payload).with_target(conn_id));
    }

    /// Non-blocking send into a connection's outbound queue
    fn deliver(&self, conn_id: &str, msg: BusMessage) {
        let Some(conn) = self.registry.get(conn_id) else {
            return;
        };
        match conn.outbound.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(conn_id = %conn_id, event = %msg.event_type, "Outbound queue full, message dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(conn_id = %conn_id, "Outbound queue closed, disconnect pending");
            }
        }
    }

    fn broadcast<I>(&self, ids: I, msg: &BusMessage)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        for id in ids {
            self.deliver(&id, msg.clone());
        }
    }

    fn broadcast_connection_status(&self) {
        let status = ConnectionStatus {
            connections: self.registry.counts(),
        };
        self.broadcast(
            self.registry.all_members(),
            &BusMessage::connection_status(&status),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CatalogData, StaticCatalog};
    use serde_json::json;
    use shared::message::{CheckOrderStatusPayload, ConnectionStatus};
    use shared::order::OrderStatus;
    use std::time::Duration;

    struct Peer {
        id: String,
        session: Uuid,
        rx: mpsc::Receiver<BusMessage>,
    }

    impl Peer {
        /// Everything queued so far (call after a hub sync point)
        fn drain(&mut self) -> Vec<BusMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }

        fn drain_of(&mut self, event: EventType) -> Vec<BusMessage> {
            self.drain().into_iter().filter(|m| m.event_type == event).collect()
        }
    }

    fn start(config: HubConfig) -> (HubHandle, CancellationToken) {
        let catalog = Arc::new(StaticCatalog::new(CatalogData {
            products: vec![json!({"id": 1, "name": "Latte", "categoryId": 2})],
            ..Default::default()
        }));
        let shutdown = CancellationToken::new();
        let (handle, _task) = Hub::spawn(config, 64, catalog, None, shutdown.clone());
        (handle, shutdown)
    }

    async fn connect(hub: &HubHandle, id: &str) -> Peer {
        let (tx, rx) = mpsc::channel(64);
        let session = Uuid::new_v4();
        hub.connect(id.to_string(), session, None, tx).await.unwrap();
        Peer {
            id: id.to_string(),
            session,
            rx,
        }
    }

    /// Wait until every command queued before this call is processed
    async fn sync(hub: &HubHandle) {
        hub.orders().await.unwrap();
    }

    async fn send(hub: &HubHandle, peer: &Peer, msg: BusMessage) -> BusMessage {
        hub.inbound(peer.id.clone(), peer.session, msg.clone()).await.unwrap();
        sync(hub).await;
        msg
    }

    async fn register(hub: &HubHandle, peer: &mut Peer, role: &str) {
        let msg = BusMessage::register(&RegisterPayload {
            role: role.into(),
            user_id: None,
        });
        send(hub, peer, msg).await;
        peer.drain();
    }

    fn new_order(id: i64) -> BusMessage {
        BusMessage::json(
            EventType::NewOrder,
            &json!({
                "id": id,
                "items": [{"name": "Latte", "quantity": 2, "unitPrice": 60}],
                "total": 120,
                "paymentMethod": "cash"
            }),
        )
        .unwrap()
    }

    fn update(id: i64, status: OrderStatus) -> BusMessage {
        BusMessage::update_order_status(&UpdateOrderStatusPayload {
            order_id: id,
            status,
            note: None,
        })
    }

    fn response_to(peer: &mut Peer, request: &BusMessage) -> ResponsePayload {
        peer.drain()
            .into_iter()
            .find(|m| m.correlation_id == Some(request.request_id))
            .expect("correlated response")
            .parse_payload()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_register_broadcast_counts() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut b = connect(&hub, "b").await;
        sync(&hub).await;
        a.drain();
        b.drain();

        let msg = BusMessage::register(&RegisterPayload {
            role: "kitchen".into(),
            user_id: None,
        });
        send(&hub, &b, msg).await;

        let status: ConnectionStatus = a.drain_of(EventType::ConnectionStatus)[0]
            .parse_payload()
            .unwrap();
        assert_eq!(status.connections.kitchen, 1);

        // Kitchen also gets the (empty) backlog, and no response
        let from_b = b.drain();
        assert!(from_b.iter().any(|m| m.event_type == EventType::OrderBacklog));
        assert!(!from_b.iter().any(|m| m.event_type == EventType::Response));
        assert_eq!(hub.connections().await.unwrap().kitchen, 1);
    }

    #[tokio::test]
    async fn test_new_order_then_status_update_end_to_end() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "customer-a").await;
        let mut b = connect(&hub, "kitchen-b").await;
        register(&hub, &mut a, "customer").await;
        register(&hub, &mut b, "kitchen").await;
        a.drain();

        let request = send(&hub, &a, new_order(101)).await;
        let ack = response_to(&mut a, &request);
        assert!(ack.success);
        assert_eq!(ack.parse_data::<NewOrderAck>().unwrap().status, OrderStatus::Pending);

        let pushed = b.drain_of(EventType::NewOrder);
        assert_eq!(pushed.len(), 1);
        let snapshot: OrderSnapshot = pushed[0].parse_payload().unwrap();
        assert_eq!(snapshot.order_id, 101);
        assert_eq!(snapshot.status, OrderStatus::Pending);
        assert_eq!(snapshot.total, 120.0);

        let request = send(&hub, &b, update(101, OrderStatus::Preparing)).await;
        for peer in [&mut a, &mut b] {
            let all = peer.drain();
            let updates: Vec<_> = all
                .iter()
                .filter(|m| m.event_type == EventType::OrderStatusUpdated)
                .collect();
            assert_eq!(updates.len(), 1, "{} must see exactly one update", peer.id);
            let event: OrderStatusUpdated = updates[0].parse_payload().unwrap();
            assert_eq!(event.order_id, 101);
            assert_eq!(event.status, OrderStatus::Preparing);
            assert_eq!(event.previous_status, OrderStatus::Pending);

            if peer.id == "kitchen-b" {
                let ack: ResponsePayload = all
                    .iter()
                    .find(|m| m.correlation_id == Some(request.request_id))
                    .unwrap()
                    .parse_payload()
                    .unwrap();
                assert!(ack.success);
            }
        }
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_rejected_without_broadcast() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut b = connect(&hub, "b").await;
        register(&hub, &mut a, "staff").await;
        register(&hub, &mut b, "kitchen").await;
        a.drain();

        let request = send(&hub, &a, update(999, OrderStatus::Ready)).await;
        let response = response_to(&mut a, &request);
        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::OrderNotFound));
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_transitions_leave_store_unchanged() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        register(&hub, &mut a, "staff").await;
        send(&hub, &a, new_order(1)).await;
        a.drain();

        let request = send(&hub, &a, update(1, OrderStatus::Completed)).await;
        let response = response_to(&mut a, &request);
        assert_eq!(response.error_code, Some(ErrorCode::InvalidStatusTransition));
        assert_eq!(hub.orders().await.unwrap()[0].status, OrderStatus::Pending);

        for status in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed] {
            send(&hub, &a, update(1, status)).await;
        }
        a.drain();

        let request = send(&hub, &a, update(1, OrderStatus::Cancelled)).await;
        let response = response_to(&mut a, &request);
        assert_eq!(response.error_code, Some(ErrorCode::OrderAlreadyTerminal));
        assert_eq!(hub.orders().await.unwrap()[0].status, OrderStatus::Completed);

        // Repeating the terminal status is a retry, not a new transition
        let request = send(&hub, &a, update(1, OrderStatus::Completed)).await;
        let response = response_to(&mut a, &request);
        assert!(response.success);
        assert!(!response.parse_data::<StatusUpdateAck>().unwrap().changed);
    }

    #[tokio::test]
    async fn test_repeated_status_is_idempotent() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut b = connect(&hub, "b").await;
        register(&hub, &mut a, "kitchen").await;
        register(&hub, &mut b, "customer").await;
        send(&hub, &a, new_order(5)).await;
        send(&hub, &a, update(5, OrderStatus::Preparing)).await;
        a.drain();
        b.drain();

        let request = send(&hub, &a, update(5, OrderStatus::Preparing)).await;
        let response = response_to(&mut a, &request);
        assert!(response.success);
        assert!(!response.parse_data::<StatusUpdateAck>().unwrap().changed);
        assert!(b.drain_of(EventType::OrderStatusUpdated).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_new_order_is_acked_not_rebroadcast() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut k = connect(&hub, "k").await;
        register(&hub, &mut a, "customer").await;
        register(&hub, &mut k, "kitchen").await;

        send(&hub, &a, new_order(9)).await;
        assert_eq!(k.drain_of(EventType::NewOrder).len(), 1);

        let retry = send(&hub, &a, new_order(9)).await;
        let response = response_to(&mut a, &retry);
        assert!(response.success);
        assert!(k.drain_of(EventType::NewOrder).is_empty());
        assert_eq!(hub.orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_gets_summary_and_backlog() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut admin = connect(&hub, "admin").await;
        register(&hub, &mut a, "customer").await;
        register(&hub, &mut admin, "admin").await;

        send(&hub, &a, new_order(11)).await;
        let notes = admin.drain();
        assert!(notes.iter().all(|m| m.event_type != EventType::NewOrder));
        let summary: NewOrderNotification = notes
            .iter()
            .find(|m| m.event_type == EventType::NewOrderNotification)
            .unwrap()
            .parse_payload()
            .unwrap();
        assert_eq!(summary.item_count, 2);

        let mut late = connect(&hub, "late-staff").await;
        sync(&hub).await;
        late.drain();
        send(&hub, &late, BusMessage::register(&RegisterPayload {
            role: "staff".into(),
            user_id: Some("7".into()),
        }))
        .await;
        let backlog: OrderBacklog = late.drain_of(EventType::OrderBacklog)[0].parse_payload().unwrap();
        assert_eq!(backlog.orders.len(), 1);
        assert_eq!(backlog.orders[0].order_id, 11);
    }

    #[tokio::test]
    async fn test_huge_quantities_are_summed_without_stopping_hub() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut admin = connect(&hub, "admin").await;
        register(&hub, &mut a, "customer").await;
        register(&hub, &mut admin, "admin").await;

        let order = BusMessage::json(
            EventType::NewOrder,
            &json!({
                "id": 77,
                "items": [
                    {"name": "Latte", "quantity": i32::MAX, "unitPrice": 1},
                    {"name": "Mocha", "quantity": i32::MAX, "unitPrice": 1}
                ]
            }),
        )
        .unwrap();
        let request = send(&hub, &a, order).await;
        assert!(response_to(&mut a, &request).success);

        let summary: NewOrderNotification = admin.drain_of(EventType::NewOrderNotification)[0]
            .parse_payload()
            .unwrap();
        assert_eq!(summary.item_count, 2 * i64::from(i32::MAX));

        // Actor still answers
        send(&hub, &a, new_order(78)).await;
        assert_eq!(hub.orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_positive_quantity_is_rejected() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut k = connect(&hub, "k").await;
        register(&hub, &mut a, "customer").await;
        register(&hub, &mut k, "kitchen").await;

        for quantity in [0, -3] {
            let order = BusMessage::json(
                EventType::NewOrder,
                &json!({
                    "items": [
                        {"name": "Latte", "quantity": 1, "unitPrice": 60},
                        {"name": "Scone", "quantity": quantity, "unitPrice": 30}
                    ]
                }),
            )
            .unwrap();
            let request = send(&hub, &a, order).await;
            let response = response_to(&mut a, &request);
            assert!(!response.success);
            assert_eq!(response.error_code, Some(ErrorCode::ValidationFailed));
        }

        assert!(hub.orders().await.unwrap().is_empty());
        assert!(k.drain_of(EventType::NewOrder).is_empty());
    }

    #[tokio::test]
    async fn test_frames_from_replaced_session_are_dropped() {
        let (hub, _shutdown) = start(HubConfig::default());
        let stale = connect(&hub, "pos").await;
        let mut fresh = connect(&hub, "pos").await;
        register(&hub, &mut fresh, "staff").await;
        fresh.drain();

        // Still queued from the old socket when the reconnect won
        let request = send(&hub, &stale, new_order(21)).await;
        assert!(hub.orders().await.unwrap().is_empty());
        assert!(
            fresh
                .drain()
                .iter()
                .all(|m| m.correlation_id != Some(request.request_id))
        );

        let request = send(&hub, &fresh, new_order(21)).await;
        assert!(response_to(&mut fresh, &request).success);
        assert_eq!(hub.orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_forbidden_events_answer_sender_only() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let mut b = connect(&hub, "b").await;
        register(&hub, &mut a, "staff").await;
        register(&hub, &mut b, "staff").await;
        a.drain();

        let garbage = BusMessage::new(EventType::UpdateOrderStatus, b"{not json".to_vec());
        let request = send(&hub, &a, garbage).await;
        assert_eq!(response_to(&mut a, &request).error_code, Some(ErrorCode::InvalidFormat));

        let forged = BusMessage::order_removed(&OrderRemoved { order_id: 1 });
        let request = send(&hub, &a, forged).await;
        assert_eq!(response_to(&mut a, &request).error_code, Some(ErrorCode::InvalidRequest));

        assert!(b.drain().is_empty());

        // Hub keeps serving
        send(&hub, &a, new_order(2)).await;
        assert_eq!(hub.orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_status_found_and_missing() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        register(&hub, &mut a, "customer").await;
        send(&hub, &a, new_order(3)).await;
        a.drain();

        let request = send(&hub, &a, BusMessage::check_order_status(&CheckOrderStatusPayload { order_id: 3 })).await;
        let found = response_to(&mut a, &request).parse_data::<OrderLookup>().unwrap();
        assert_eq!(found.into_order().unwrap().order_id, 3);

        let request = send(&hub, &a, BusMessage::check_order_status(&CheckOrderStatusPayload { order_id: 4 })).await;
        let response = response_to(&mut a, &request);
        assert!(response.success);
        assert_eq!(response.data.unwrap()["error"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_order_is_evicted_after_grace() {
        let grace = Duration::from_secs(60);
        let (archive_tx, mut archive_rx) = mpsc::unbounded_channel();
        let catalog = Arc::new(StaticCatalog::default());
        let (hub, _task) = Hub::spawn(
            HubConfig {
                eviction_grace: grace,
                ..Default::default()
            },
            64,
            catalog,
            Some(archive_tx),
            CancellationToken::new(),
        );

        let mut a = connect(&hub, "a").await;
        let mut b = connect(&hub, "b").await;
        register(&hub, &mut a, "kitchen").await;
        register(&hub, &mut b, "customer").await;
        send(&hub, &a, new_order(42)).await;
        for status in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed] {
            send(&hub, &a, update(42, status)).await;
        }
        b.drain();

        let archived = archive_rx.try_recv().unwrap();
        assert_eq!(archived.status, OrderStatus::Completed);

        tokio::time::sleep(grace - Duration::from_millis(1)).await;
        assert_eq!(hub.orders().await.unwrap().len(), 1, "not evicted before grace");

        tokio::time::sleep(Duration::from_millis(2)).await;
        sync(&hub).await;
        assert!(hub.orders().await.unwrap().is_empty());

        let removed: OrderRemoved = b.drain_of(EventType::OrderRemoved)[0].parse_payload().unwrap();
        assert_eq!(removed.order_id, 42);

        let request = send(&hub, &b, BusMessage::check_order_status(&CheckOrderStatusPayload { order_id: 42 })).await;
        let response = response_to(&mut b, &request);
        assert!(response.success);
        assert!(response.parse_data::<OrderLookup>().unwrap().into_order().is_none());
    }

    #[tokio::test]
    async fn test_interested_fanout_skips_unrelated_customers() {
        let (hub, _shutdown) = start(HubConfig {
            fanout: crate::hub::FanoutPolicy::Interested,
            ..Default::default()
        });
        let mut owner = connect(&hub, "owner").await;
        let mut other = connect(&hub, "other").await;
        let mut kitchen = connect(&hub, "kitchen").await;
        register(&hub, &mut owner, "customer").await;
        register(&hub, &mut other, "customer").await;
        register(&hub, &mut kitchen, "kitchen").await;

        send(&hub, &owner, new_order(8)).await;
        send(&hub, &kitchen, update(8, OrderStatus::Preparing)).await;

        assert_eq!(owner.drain_of(EventType::OrderStatusUpdated).len(), 1);
        assert_eq!(kitchen.drain_of(EventType::OrderStatusUpdated).len(), 1);
        assert!(other.drain_of(EventType::OrderStatusUpdated).is_empty());
    }

    #[tokio::test]
    async fn test_query_is_answered_by_catalog() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        sync(&hub).await;
        a.drain();

        let request = BusMessage::query(&QueryPayload {
            resource: "products".into(),
            params: Some(json!({"categoryId": 2})),
        });
        hub.inbound("a".into(), a.session, request.clone()).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let msg = a.rx.recv().await.unwrap();
                if msg.correlation_id == Some(request.request_id) {
                    return msg;
                }
            }
        })
        .await
        .unwrap();
        let response: ResponsePayload = reply.parse_payload().unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()[0]["name"], "Latte");
    }

    #[tokio::test]
    async fn test_disconnect_updates_counts() {
        let (hub, _shutdown) = start(HubConfig::default());
        let mut a = connect(&hub, "a").await;
        let session = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        hub.connect("k".into(), session, None, tx).await.unwrap();
        hub.inbound(
            "k".into(),
            session,
            BusMessage::register(&RegisterPayload {
                role: "kitchen".into(),
                user_id: None,
            }),
        )
        .await
        .unwrap();
        sync(&hub).await;
        assert_eq!(hub.connections().await.unwrap().kitchen, 1);
        a.drain();

        hub.disconnect("k".into(), session).await.unwrap();
        sync(&hub).await;
        let status: ConnectionStatus = a.drain_of(EventType::ConnectionStatus)[0].parse_payload().unwrap();
        assert_eq!(status.connections.kitchen, 0);
    }
}
