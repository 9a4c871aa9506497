//! Binary frame layout for stream transports
//!
//! ```text
//! ┌──────┬──────────────┬────────────────┬──────────┬─────────────┐
//! │ type │  request id  │ correlation id │  length  │   payload   │
//! │  1B  │     16B      │  16B (nil=none)│  4B LE   │  N B (JSON) │
//! └──────┴──────────────┴────────────────┴──────────┴─────────────┘
//! ```

use thiserror::Error;
use uuid::Uuid;

use super::{BusMessage, EventType};

/// Fixed header size: type + request id + correlation id + length
pub const FRAME_HEADER_LEN: usize = 1 + 16 + 16 + 4;

/// Largest payload accepted from the wire (1 MiB)
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid event type: {0}")]
    InvalidEventType(u8),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub event_type: EventType,
    pub request_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub payload_len: usize,
}

impl FrameHeader {
    pub fn parse(buf: &[u8; FRAME_HEADER_LEN]) -> Result<Self, FrameError> {
        let event_type =
            EventType::try_from(buf[0]).map_err(|_| FrameError::InvalidEventType(buf[0]))?;

        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[1..17]);
        let request_id = Uuid::from_bytes(id);

        id.copy_from_slice(&buf[17..33]);
        let correlation_raw = Uuid::from_bytes(id);
        let correlation_id = (!correlation_raw.is_nil()).then_some(correlation_raw);

        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[33..37]);
        let payload_len = u32::from_le_bytes(len) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload_len));
        }

        Ok(Self {
            event_type,
            request_id,
            correlation_id,
            payload_len,
        })
    }

    pub fn into_message(self, payload: Vec<u8>) -> BusMessage {
        BusMessage {
            request_id: self.request_id,
            event_type: self.event_type,
            source: None,
            correlation_id: self.correlation_id,
            target: None,
            payload,
        }
    }
}

/// Encode a message into a single frame buffer
pub fn encode(msg: &BusMessage) -> Result<Vec<u8>, FrameError> {
    if msg.payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(msg.payload.len()));
    }

    let mut data = Vec::with_capacity(FRAME_HEADER_LEN + msg.payload.len());
    data.push(msg.event_type as u8);
    data.extend_from_slice(msg.request_id.as_bytes());
    // nil UUID when there is no correlation
    data.extend_from_slice(msg.correlation_id.unwrap_or(Uuid::nil()).as_bytes());
    data.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&msg.payload);
    Ok(data)
}
