//! Health routes
//!
//! | Path | Method | Meaning |
//! |------|--------|---------|
//! | /health | GET | liveness |
//! | /health/detailed | GET | hub round-trip and connection counts |

use std::time::Instant;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use shared::models::ConnectionCounts;

use crate::api::REQUEST_TIMEOUT;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    hub: CheckResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<ConnectionCounts>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let start = Instant::now();
    let (hub, connections) = match tokio::time::timeout(REQUEST_TIMEOUT, state.hub.connections()).await {
        Ok(Ok(counts)) => (
            CheckResult {
                status: "ok",
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Some(counts),
        ),
        Ok(Err(e)) => (
            CheckResult {
                status: "error",
                latency_ms: None,
                error: Some(e.to_string()),
            },
            None,
        ),
        Err(_) => (
            CheckResult {
                status: "error",
                latency_ms: None,
                error: Some("hub did not answer in time".into()),
            },
            None,
        ),
    };

    Json(DetailedHealthResponse {
        status: if hub.status == "ok" { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        hub,
        connections,
    })
}
