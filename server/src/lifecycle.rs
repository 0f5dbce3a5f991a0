//! Application lifecycle and graceful shutdown.
//!
//! [`Application::run`] owns the running service:
//!
//! 1. **Startup**: start the listener host, serve HTTP (and `/metrics`)
//! 2. **Runtime**: project broker messages until the shutdown future resolves
//! 3. **Shutdown**, in order:
//!    1. stop the listener host, waiting for in-flight messages
//!    2. drain fan-out tasks, bounded by the shutdown timeout
//!    3. close the websocket hub, disconnecting every client
//!    4. stop the HTTP servers
//!
//! Fan-out is drained before the hub closes so realtime actions for messages
//! that were already acknowledged still reach connected clients.

use crate::bootstrap::Pipeline;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use futures::future::select_all;
use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticketflow_core::PipelineError;
use ticketflow_runtime::EndpointStats;
use ticketflow_runtime::metrics::MetricsServer;
use ticketflow_web::WebSocketHub;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Errors that end [`Application::run`].
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// The listener host failed to start or stop.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An HTTP server failed.
    #[error("HTTP server error: {0}")]
    Io(#[from] io::Error),

    /// An HTTP server task panicked or was cancelled.
    #[error("HTTP server task failed: {0}")]
    Task(String),
}

/// What was left behind at shutdown.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Per-queue counters of the stopped listener host.
    pub endpoints: Vec<EndpointStats>,
    /// Whether every fan-out task finished within the shutdown timeout.
    pub fanout_drained: bool,
}

/// A fully assembled service, ready to run.
pub struct Application {
    http: TcpListener,
    router: Router,
    metrics: Option<(TcpListener, Router)>,
    pipeline: Pipeline,
    hub: WebSocketHub,
    shutdown_timeout: Duration,
}

impl Application {
    /// Create an application serving `router` on `http`.
    #[must_use]
    pub fn new(
        http: TcpListener,
        router: Router,
        pipeline: Pipeline,
        hub: WebSocketHub,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            http,
            router,
            metrics: None,
            pipeline,
            hub,
            shutdown_timeout,
        }
    }

    /// Also serve `/metrics` from `metrics` on `listener`.
    #[must_use]
    pub fn with_metrics(mut self, listener: TcpListener, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some((listener, metrics_router(metrics)));
        self
    }

    /// Address the HTTP routes are served on.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.http.local_addr()
    }

    /// Run until `shutdown` resolves, then shut down in order.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the listener host cannot start or stop,
    /// or if an HTTP server fails. An HTTP server that fails while running
    /// triggers the same ordered shutdown before the error is returned.
    pub async fn run<F>(self, shutdown: F) -> Result<ShutdownReport, LifecycleError>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            http,
            router,
            metrics,
            mut pipeline,
            hub,
            shutdown_timeout,
        } = self;

        pipeline.listener.start().await?;

        let (stop_http, http_stop) = watch::channel(false);
        let mut servers = Vec::new();
        info!(addr = ?http.local_addr().ok(), "HTTP server listening");
        servers.push(serve(http, router, http_stop.clone()));
        if let Some((listener, router)) = metrics {
            info!(addr = ?listener.local_addr().ok(), "Metrics endpoint listening");
            servers.push(serve(listener, router, http_stop));
        }

        let mut first_error = None;
        let exited = tokio::select! {
            () = shutdown => {
                info!("Shutdown requested");
                None
            }
            (result, index) = first_to_exit(&mut servers) => {
                warn!("HTTP server stopped unexpectedly, shutting down");
                first_error = result.err();
                Some(index)
            }
        };
        if let Some(index) = exited {
            servers.remove(index);
        }

        let endpoints = pipeline.listener.stop().await?;
        for stats in &endpoints {
            info!(
                queue = %stats.queue,
                received = stats.received,
                acked = stats.acked,
                nacked = stats.nacked,
                unsettled = stats.unsettled,
                "Receive endpoint stopped"
            );
        }

        let fanout_drained = pipeline.fanout().drain_with_timeout(shutdown_timeout).await;
        if !fanout_drained {
            warn!(?shutdown_timeout, "Fan-out did not drain before the shutdown timeout");
        }

        hub.close().await;

        let _ = stop_http.send(true);
        for server in servers {
            let outcome = match tokio::time::timeout(shutdown_timeout, server).await {
                Ok(Ok(result)) => result.map_err(LifecycleError::from),
                Ok(Err(e)) => Err(LifecycleError::Task(e.to_string())),
                Err(_) => {
                    warn!("HTTP server did not stop before the shutdown timeout");
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        info!(fanout_drained, "Graceful shutdown complete");
        Ok(ShutdownReport {
            endpoints,
            fanout_drained,
        })
    }
}

fn serve(
    listener: TcpListener,
    router: Router,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            })
            .into_future(),
    )
}

/// Outcome and index of whichever server task finishes first.
async fn first_to_exit(
    servers: &mut [JoinHandle<io::Result<()>>],
) -> (Result<(), LifecycleError>, usize) {
    let (outcome, index, _) = select_all(servers.iter_mut()).await;
    let result = match outcome {
        Ok(result) => result.map_err(LifecycleError::from),
        Err(e) => Err(LifecycleError::Task(e.to_string())),
    };
    (result, index)
}

fn metrics_router(metrics: Arc<MetricsServer>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

#[allow(clippy::unused_async)] // Axum handler signature requires async
async fn render_metrics(State(metrics): State<Arc<MetricsServer>>) -> (StatusCode, String) {
    metrics.render().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "metrics recorder not installed".to_string(),
            )
        },
        |text| (StatusCode::OK, text),
    )
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
