//! Realtime websocket transport for Ticketflow.
//!
//! Projection handlers push realtime actions through the
//! [`RealtimeTransport`](ticketflow_core::realtime::RealtimeTransport) seam.
//! This crate provides the production implementation of that seam, the
//! [`WebSocketHub`], and the Axum routes UI clients connect to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   broadcast()   ┌──────────────┐   text frames   ┌────────┐
//! │ Projection handlers  │ ──────────────► │ WebSocketHub │ ──────────────► │ Client │
//! └──────────────────────┘                 └──────────────┘                 └────────┘
//!                                                 ▲
//!                                   GET /ws ──────┘ register / unregister
//! ```
//!
//! # Routes
//!
//! - `GET /ws`: websocket upgrade; the client then receives every action
//! - `GET /health`: liveness
//! - `GET /health/realtime`: number of connected clients
//!
//! # Example
//!
//! ```ignore
//! let hub = WebSocketHub::new();
//! let app = ticketflow_web::router(hub.clone());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod handlers;
pub mod hub;

use axum::{Router, routing::get};

pub use hub::{ClientId, DEFAULT_CLIENT_BUFFER, DEFAULT_CLIENT_TIMEOUT, WebSocketHub};

/// Routes for the realtime websocket and health checks.
pub fn router(hub: WebSocketHub) -> Router {
    Router::new()
        .route("/ws", get(handlers::websocket::handle))
        .route("/health", get(handlers::health_check))
        .route("/health/realtime", get(handlers::realtime_health))
        .with_state(hub)
}
