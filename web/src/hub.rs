//! Registry of connected websocket clients.
//!
//! [`WebSocketHub`] is the production [`RealtimeTransport`]. Each connected
//! client is a bounded channel drained by its socket task. A broadcast
//! encodes the action once and offers it to every client concurrently:
//!
//! - a client that accepts the message within the client timeout counts as
//!   delivered
//! - a client whose buffer stays full for longer, or whose socket is gone,
//!   is dropped from the hub
//!
//! A broadcast therefore never waits longer than one client timeout, no
//! matter how many clients are slow.

use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use ticketflow_core::realtime::{
    BroadcastReport, RealtimeAction, RealtimeError, RealtimeFuture, RealtimeTransport,
};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Default time a single client may take to accept a message.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_millis(250);

/// Default number of messages buffered per client.
pub const DEFAULT_CLIENT_BUFFER: usize = 64;

/// Identifier of one connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

struct HubInner {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    client_timeout: Duration,
    client_buffer: usize,
}

/// Websocket client registry implementing [`RealtimeTransport`].
///
/// Cheap to clone; clones share the same clients.
#[derive(Clone)]
pub struct WebSocketHub {
    inner: Arc<HubInner>,
}

impl Default for WebSocketHub {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketHub {
    /// Create a hub with the default client timeout and buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CLIENT_TIMEOUT, DEFAULT_CLIENT_BUFFER)
    }

    /// Create a hub with a custom per-client timeout and buffer size.
    ///
    /// A buffer of zero is raised to one.
    #[must_use]
    pub fn with_limits(client_timeout: Duration, client_buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                clients: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                client_timeout,
                client_buffer: client_buffer.max(1),
            }),
        }
    }

    /// Time a single client may take to accept a message.
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        self.inner.client_timeout
    }

    /// Register a client; its messages arrive on the returned receiver.
    ///
    /// The client is dropped from the hub once the receiver is dropped and a
    /// broadcast notices it.
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.client_buffer);

        let count = {
            let mut clients = self.inner.clients.write().await;
            clients.insert(id, sender);
            clients.len()
        };
        record_clients(count);
        info!(client = %id, clients = count, "Realtime client connected");
        (id, receiver)
    }

    /// Remove a client.
    pub async fn unregister(&self, id: ClientId) {
        let (removed, count) = {
            let mut clients = self.inner.clients.write().await;
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };
        if removed {
            record_clients(count);
            info!(client = %id, clients = count, "Realtime client disconnected");
        }
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.inner.clients.read().await.len()
    }

    /// Disconnect every client and refuse further broadcasts.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut clients = self.inner.clients.write().await;
            let count = clients.len();
            clients.clear();
            count
        };
        record_clients(0);
        info!(dropped, "Realtime hub closed");
    }

    async fn deliver(&self, text: String) -> BroadcastReport {
        let clients: Vec<(ClientId, mpsc::Sender<String>)> = self
            .inner
            .clients
            .read()
            .await
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let timeout = self.inner.client_timeout;
        let text = text.as_str();
        let outcomes = join_all(clients.into_iter().map(|(id, sender)| async move {
            let accepted = matches!(
                tokio::time::timeout(timeout, sender.send(text.to_owned())).await,
                Ok(Ok(()))
            );
            (id, accepted)
        }))
        .await;

        let mut report = BroadcastReport::default();
        let mut dropped = Vec::new();
        for (id, accepted) in outcomes {
            if accepted {
                report.delivered += 1;
            } else {
                dropped.push(id);
            }
        }

        if !dropped.is_empty() {
            report.dropped = dropped.len();
            let count = {
                let mut clients = self.inner.clients.write().await;
                for id in &dropped {
                    clients.remove(id);
                }
                clients.len()
            };
            record_clients(count);
            metrics::counter!("realtime_clients_dropped_total")
                .increment(dropped.len() as u64);
            warn!(
                dropped = ?dropped,
                ?timeout,
                clients = count,
                "Dropped slow or disconnected realtime clients"
            );
        }
        report
    }
}

impl fmt::Debug for WebSocketHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketHub")
            .field("client_timeout", &self.inner.client_timeout)
            .field("client_buffer", &self.inner.client_buffer)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RealtimeTransport for WebSocketHub {
    fn broadcast<'a>(
        &'a self,
        action_type: &'a str,
        payload: serde_json::Value,
    ) -> RealtimeFuture<'a> {
        Box::pin(async move {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(RealtimeError::Unavailable("hub is closed".to_string()));
            }

            let text = serde_json::to_string(&RealtimeAction::new(action_type, payload))
                .map_err(|e| RealtimeError::Encoding(e.to_string()))?;

            let report = self.deliver(text).await;
            debug!(
                action_type,
                delivered = report.delivered,
                dropped = report.dropped,
                "Realtime action broadcast"
            );
            Ok(report)
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_clients(count: usize) {
    metrics::gauge!("realtime_clients").set(count as f64);
}
