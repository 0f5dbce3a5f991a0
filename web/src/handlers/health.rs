//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::hub::WebSocketHub;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, broker).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Realtime transport status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RealtimeHealth {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Connected websocket clients.
    pub clients: usize,
}

/// Realtime status with the number of connected clients.
///
/// # Endpoint
///
/// ```text
/// GET /health/realtime
/// ```
///
/// # Response
///
/// ```json
/// { "status": "ok", "clients": 3 }
/// ```
pub async fn realtime_health(
    State(hub): State<WebSocketHub>,
) -> (StatusCode, Json<RealtimeHealth>) {
    let clients = hub.client_count().await;
    (
        StatusCode::OK,
        Json(RealtimeHealth {
            status: "ok",
            clients,
        }),
    )
}
