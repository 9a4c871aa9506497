//! Transport layer abstraction
//!
//! ```text
//!         ┌────────────────────┐
//!         │   Transport Trait  │
//!         └────────┬───────────┘
//!                  │
//!          ┌───────┴───────┐
//!          ▼               ▼
//!    TcpTransport    MemoryTransport
//!    (framed TCP)    (same process)
//! ```
//!
//! Both ends of a connection speak [`BusMessage`]; only stream transports use
//! the binary frame codec from `shared::message::frame`.

mod memory;
mod tcp;

pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use shared::message::frame::{self, FRAME_HEADER_LEN, FrameError, FrameHeader};
use shared::message::BusMessage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::utils::{AppError, ErrorCode};

/// Bidirectional message transport of one connection
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Read the next message; `ClientDisconnected` on a clean close
    async fn read_message(&self) -> Result<BusMessage, AppError>;

    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError>;

    async fn close(&self) -> Result<(), AppError>;

    /// Remote address, if the transport has one
    fn peer_addr(&self) -> Option<String> {
        None
    }
}

fn frame_error(e: FrameError) -> AppError {
    match e {
        FrameError::InvalidEventType(_) => AppError::invalid(e.to_string()),
        FrameError::PayloadTooLarge(_) => AppError::with_message(ErrorCode::InvalidFormat, e.to_string()),
    }
}

/// Whether a transport error is a protocol violation by the peer
pub(crate) fn is_protocol_error(err: &AppError) -> bool {
    matches!(err.code, ErrorCode::InvalidRequest | ErrorCode::InvalidFormat)
}

// ========== Stream helpers ==========

/// Read one framed [`BusMessage`] from an async stream
pub(crate) async fn read_from_stream<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<BusMessage, AppError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(AppError::client_disconnected());
        }
        Err(e) => return Err(AppError::internal(format!("Read header failed: {}", e))),
    }

    let header = FrameHeader::parse(&header).map_err(frame_error)?;

    let mut payload = vec![0u8; header.payload_len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| AppError::internal(format!("Read payload failed: {}", e)))?;

    Ok(header.into_message(payload))
}

/// Write one framed [`BusMessage`] to an async stream
pub(crate) async fn write_to_stream<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &BusMessage,
) -> Result<(), AppError> {
    let data = frame::encode(msg).map_err(frame_error)?;
    writer
        .write_all(&data)
        .await
        .map_err(|e| AppError::internal(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| AppError::internal(format!("Flush failed: {}", e)))?;
    Ok(())
}
