//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound | Self::OrderNotFound => StatusCode::NOT_FOUND,

            Self::AlreadyExists | Self::OrderAlreadyExists | Self::OrderAlreadyTerminal => {
                StatusCode::CONFLICT
            }

            Self::InvalidStatusTransition => StatusCode::UNPROCESSABLE_ENTITY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TimeoutError | Self::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,

            Self::InternalError
            | Self::ConfigError
            | Self::ClientDisconnected
            | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,

            _ => StatusCode::BAD_REQUEST,
        }
    }
}
