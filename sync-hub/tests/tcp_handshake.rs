//! TCP listener: handshake rules and a round trip through the client library

use std::sync::Arc;
use std::time::Duration;

use shared::error::ErrorCode;
use shared::message::frame::{self, FRAME_HEADER_LEN, FrameHeader};
use shared::message::{
    BusMessage, HandshakePayload, NewOrderPayload, OrderRemoved, PROTOCOL_VERSION, ResponsePayload,
};
use shared::models::Role;
use shared::order::{OrderItem, OrderStatus};
use sync_client::{MessageClient, MessageClientConfig, MessageError, OrderSync};
use sync_hub::message::TransportConfig;
use sync_hub::services::StaticCatalog;
use sync_hub::{Hub, HubConfig, MessageBus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Hub listening on an ephemeral port; stops when the guard drops
async fn serve() -> (String, MessageBus, DropGuard) {
    let shutdown = CancellationToken::new();
    let (handle, _task) = Hub::spawn(
        HubConfig::default(),
        64,
        Arc::new(StaticCatalog::default()),
        None,
        shutdown.clone(),
    );
    let config = TransportConfig {
        handshake_timeout: Duration::from_millis(500),
        ..TransportConfig::default()
    };
    let bus = MessageBus::new(handle, config).with_shutdown(shutdown.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = bus.clone();
    tokio::spawn(async move { server.serve(listener).await });

    (addr, bus, shutdown.drop_guard())
}

async fn write_frame(stream: &mut TcpStream, msg: &BusMessage) {
    stream.write_all(&frame::encode(msg).unwrap()).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Option<BusMessage> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    stream.read_exact(&mut header).await.ok()?;
    let header = FrameHeader::parse(&header).unwrap();
    let mut payload = vec![0u8; header.payload_len];
    stream.read_exact(&mut payload).await.ok()?;
    Some(header.into_message(payload))
}

/// The hub closes the socket after a failed handshake
async fn assert_closed(stream: &mut TcpStream) {
    let closed = tokio::time::timeout(Duration::from_secs(2), read_frame(stream))
        .await
        .expect("socket should close");
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let (addr, _bus, _guard) = serve().await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();

    let request = BusMessage::handshake(&HandshakePayload {
        version: PROTOCOL_VERSION + 1,
        client_name: Some("old-pos".into()),
        client_version: None,
        client_id: None,
    });
    write_frame(&mut stream, &request).await;

    let reply = read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.correlation_id, Some(request.request_id));
    let response: ResponsePayload = reply.parse_payload().unwrap();
    assert!(!response.success);
    assert_eq!(response.error_code, Some(ErrorCode::ProtocolMismatch));
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_first_frame_must_be_handshake() {
    let (addr, _bus, _guard) = serve().await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();

    let request = BusMessage::order_removed(&OrderRemoved { order_id: 1 });
    write_frame(&mut stream, &request).await;

    let response: ResponsePayload = read_frame(&mut stream).await.unwrap().parse_payload().unwrap();
    assert_eq!(response.error_code, Some(ErrorCode::InvalidRequest));
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let (addr, _bus, _guard) = serve().await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_client_round_trip_over_tcp() {
    let (addr, bus, _guard) = serve().await;

    let client = MessageClient::connect_with_config(
        &addr,
        "front-counter",
        MessageClientConfig::new().with_client_id("pos-1"),
    )
    .await
    .unwrap();
    assert_eq!(client.client_id().as_deref(), Some("pos-1"));
    client.register(Role::Staff, Some("42".into())).await.unwrap();

    let orders = OrderSync::new(client.clone());
    let ack = orders
        .new_order(&NewOrderPayload {
            id: Some(500),
            items: vec![OrderItem {
                product_id: None,
                name: "Espresso".into(),
                quantity: 1,
                unit_price: 2.8,
                options: vec![],
                note: None,
            }],
            total: None,
            payment_method: None,
            customer_id: None,
            staff_id: Some("42".into()),
            note: None,
        })
        .await
        .unwrap();
    assert_eq!(ack.order_id, 500);

    let update = orders
        .update_order_status(500, OrderStatus::Preparing, None)
        .await
        .unwrap();
    assert_eq!(update.previous_status, OrderStatus::Pending);

    let live = bus.hub().orders().await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].payment_method, "cash");
    assert_eq!(bus.hub().connections().await.unwrap().staff, 1);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = MessageClient::connect(&addr, "kiosk").await.unwrap_err();
    assert!(matches!(err, MessageError::Connection(_)));
}
