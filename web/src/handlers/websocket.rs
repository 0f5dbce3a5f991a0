//! WebSocket endpoint streaming realtime actions to UI clients.
//!
//! # Architecture
//!
//! ```text
//! Client          WebSocket Handler          WebSocketHub
//!   │                    │                        │
//!   ├─ Connect ─────────>│                        │
//!   │                    ├─ register() ──────────>│
//!   │                    │                        │
//!   │                    │<── action (JSON) ──────┤  broadcast()
//!   │<─ Text frame ──────┤                        │
//!   │                    │                        │
//!   ├─ Close ───────────>│                        │
//!   │                    ├─ unregister() ────────>│
//! ```
//!
//! # Message Protocol
//!
//! The connection is push-only. Every text frame is one realtime action:
//!
//! ```json
//! { "type": "ADD_TICKET_PRIORITY_UPDATE", "payload": { "ticketId": "T1", ... } }
//! ```
//!
//! Text sent by the client is ignored.

use crate::hub::{ClientId, WebSocketHub};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::SplitSink, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Upgrade the request and register the socket with the hub.
///
/// # Example
///
/// ```ignore
/// use ticketflow_web::handlers::websocket;
/// use axum::{Router, routing::get};
///
/// let app = Router::new()
///     .route("/ws", get(websocket::handle))
///     .with_state(hub);
/// ```
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(hub): State<WebSocketHub>) -> Response {
    debug!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: WebSocketHub) {
    let (id, actions) = hub.register().await;
    let (sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(forward(id, actions, sender));

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Close(_) => {
                    debug!(client = %id, "Client requested close");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => {
                    debug!(client = %id, "Ignoring message from push-only client");
                }
                // Axum answers pings itself.
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.unregister(id).await;
    info!(client = %id, "WebSocket connection closed");
}

async fn forward(
    id: ClientId,
    mut actions: mpsc::Receiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
) {
    while let Some(text) = actions.recv().await {
        if sender.send(Message::Text(text)).await.is_err() {
            debug!(client = %id, "Client went away");
            break;
        }
    }
    // Hub closed or dropped this client.
    let _ = sender.send(Message::Close(None)).await;
}
