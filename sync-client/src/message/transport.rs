use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::MessageError;
use shared::message::BusMessage;
use shared::message::frame::{self, FRAME_HEADER_LEN, FrameHeader};

/// Transport abstraction for message bus communication
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn read_message(&self) -> Result<BusMessage, MessageError>;
    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError>;
    async fn close(&self) -> Result<(), MessageError>;
}

/// TCP Transport Implementation
#[derive(Debug, Clone)]
pub struct TcpTransport {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, MessageError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| MessageError::Connection(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_message(&self) -> Result<BusMessage, MessageError> {
        let mut reader = self.reader.lock().await;

        let mut header = [0u8; FRAME_HEADER_LEN];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(MessageError::Connection("Connection closed by server".into()));
            }
            Err(e) => return Err(MessageError::Io(e)),
        }
        let header = FrameHeader::parse(&header)
            .map_err(|e| MessageError::InvalidMessage(e.to_string()))?;

        let mut payload = vec![0u8; header.payload_len];
        reader.read_exact(&mut payload).await?;
        Ok(header.into_message(payload))
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError> {
        let data = frame::encode(msg).map_err(|e| MessageError::InvalidMessage(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MessageError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

/// In-process transport over the channel pair returned by the hub's
/// `MessageBus::connect_memory`
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// Taken on close so the hub sees the disconnect
    tx: Arc<parking_lot::Mutex<Option<mpsc::Sender<BusMessage>>>>,
    rx: Arc<Mutex<mpsc::Receiver<BusMessage>>>,
    closed: CancellationToken,
}

impl MemoryTransport {
    pub fn new(to_server: mpsc::Sender<BusMessage>, from_server: mpsc::Receiver<BusMessage>) -> Self {
        Self {
            tx: Arc::new(parking_lot::Mutex::new(Some(to_server))),
            rx: Arc::new(Mutex::new(from_server)),
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> Result<BusMessage, MessageError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(MessageError::Connection("Transport closed".into())),
            msg = rx.recv() => msg.ok_or_else(|| MessageError::Connection("Server channel closed".into())),
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or_else(|| MessageError::Connection("Transport closed".into()))?;
        tx.send(msg.clone())
            .await
            .map_err(|_| MessageError::Connection("Server channel closed".into()))
    }

    async fn close(&self) -> Result<(), MessageError> {
        self.tx.lock().take();
        self.closed.cancel();
        Ok(())
    }
}
