//! Ops HTTP routes
//!
//! - [`health`] - liveness and hub round-trip check
//! - [`orders`] - live backlog and connection counts (read-only)
//!
//! Order mutations only travel over the message bus.

pub mod health;
pub mod orders;

use std::time::Duration;

use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

/// Max in-flight ops requests
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Request timeout for ops routes
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(state: ServerState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
