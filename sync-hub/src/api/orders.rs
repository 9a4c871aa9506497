//! Live order routes
//!
//! | Path | Method | Meaning |
//! |------|--------|---------|
//! | /api/orders | GET | live backlog, oldest first |
//! | /api/orders/{id} | GET | one live order |
//! | /api/connections | GET | registered connections per role |

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use shared::models::ConnectionCounts;
use shared::order::{OrderId, OrderSnapshot};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppError, AppResult};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/orders", get(list))
        .route("/api/orders/{id}", get(get_by_id))
        .route("/api/connections", get(connections))
}

pub async fn list(State(state): State<ServerState>) -> AppResult<Json<ApiResponse<Vec<OrderSnapshot>>>> {
    let orders = state.hub.orders().await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<OrderId>,
) -> AppResult<Json<ApiResponse<OrderSnapshot>>> {
    let order = state
        .hub
        .orders()
        .await?
        .into_iter()
        .find(|o| o.order_id == id)
        .ok_or_else(|| AppError::order_not_found(id))?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn connections(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<ConnectionCounts>>> {
    let counts = state.hub.connections().await?;
    Ok(Json(ApiResponse::success(counts)))
}
