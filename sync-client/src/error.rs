//! Client error types

use shared::error::ErrorCode;
use thiserror::Error;

/// Transport-level failure of a [`MessageClient`](crate::MessageClient)
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a query or mutation
///
/// `Clone` so a query can publish it on its state channel and hand it to
/// callbacks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    /// The hub answered `success: false`
    #[error("Server error ({code:?}): {message}")]
    Server {
        code: Option<ErrorCode>,
        message: String,
    },

    #[error("Payload error: {0}")]
    Decode(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },
}

impl SyncError {
    /// Server error code, looking through `RetriesExhausted`
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SyncError::Server { code, .. } => *code,
            SyncError::RetriesExhausted { last, .. } => last.code(),
            _ => None,
        }
    }
}

impl From<MessageError> for SyncError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Timeout(_) => SyncError::Timeout,
            MessageError::Serialization(e) => SyncError::Decode(e.to_string()),
            MessageError::InvalidMessage(msg) => SyncError::Decode(msg),
            other => SyncError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_through_exhausted() {
        let err = SyncError::RetriesExhausted {
            attempts: 3,
            last: Box::new(SyncError::Server {
                code: Some(ErrorCode::OrderNotFound),
                message: "Order 9 not found".into(),
            }),
        };
        assert_eq!(err.code(), Some(ErrorCode::OrderNotFound));
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_message_timeout_maps_to_timeout() {
        let err: SyncError = MessageError::Timeout("3s".into()).into();
        assert_eq!(err, SyncError::Timeout);
    }
}
