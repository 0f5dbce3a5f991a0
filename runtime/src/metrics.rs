//! Prometheus metrics for the projection pipeline.
//!
//! Every stage records into the global `metrics` recorder:
//! - Dispatcher: dispatched events, handler failures, dispatch latency
//! - Fan-out: realtime and integration side effects per sink
//! - Listener host: received messages and how they were settled
//!
//! [`MetricsServer::start`] installs the Prometheus recorder; the server binary
//! serves [`MetricsServer::render`] on `/metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticketflow_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use ticketflow_core::FanoutSink;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder exposed for scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr` (e.g. `0.0.0.0:9090`).
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the metrics endpoint is served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed (e.g. by another test) is not an
    /// error; [`Self::handle`] then stays `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Dispatcher
    describe_counter!(
        "dispatcher_events_total",
        "Total number of events dispatched to projection handlers"
    );
    describe_counter!(
        "dispatcher_unhandled_events_total",
        "Total number of events dispatched with no registered handler"
    );
    describe_counter!(
        "dispatcher_handler_failures_total",
        "Total number of handler invocations that failed or panicked"
    );
    describe_histogram!(
        "dispatcher_dispatch_duration_seconds",
        "Time taken for all handlers of one event to finish"
    );

    // Fan-out
    describe_counter!(
        "fanout_completed_total",
        "Total number of fan-out side effects that completed"
    );
    describe_counter!(
        "fanout_failures_total",
        "Total number of fan-out side effects that failed"
    );
    describe_gauge!(
        "fanout_in_flight",
        "Fan-out tasks spawned and not yet finished"
    );

    // Listener host
    describe_counter!(
        "listener_messages_received_total",
        "Total number of broker messages received by receive endpoints"
    );
    describe_counter!(
        "listener_messages_acked_total",
        "Total number of broker messages acknowledged"
    );
    describe_counter!(
        "listener_messages_nacked_total",
        "Total number of broker messages refused"
    );
    describe_counter!(
        "listener_ack_failures_total",
        "Total number of processed broker messages whose acknowledgement failed"
    );
    describe_histogram!(
        "listener_message_duration_seconds",
        "Time from receipt to settlement of one broker message"
    );

    // Realtime transport
    describe_gauge!("realtime_clients", "Connected realtime websocket clients");
    describe_counter!(
        "realtime_clients_dropped_total",
        "Total number of realtime clients dropped for being slow or disconnected"
    );
}

/// Dispatcher metrics recorder.
pub struct DispatcherMetrics;

impl DispatcherMetrics {
    /// Record one dispatched event and how long its handlers took.
    pub fn record_dispatch(event_type: &'static str, duration: Duration) {
        counter!("dispatcher_events_total", "event_type" => event_type).increment(1);
        histogram!("dispatcher_dispatch_duration_seconds", "event_type" => event_type)
            .record(duration.as_secs_f64());
    }

    /// Record an event nobody handles.
    pub fn record_unhandled(event_type: &'static str) {
        counter!("dispatcher_unhandled_events_total", "event_type" => event_type).increment(1);
    }

    /// Record a failed handler invocation.
    pub fn record_failure(event_type: &'static str, handler: &str, kind: &'static str) {
        counter!(
            "dispatcher_handler_failures_total",
            "event_type" => event_type,
            "handler" => handler.to_string(),
            "kind" => kind
        )
        .increment(1);
    }
}

/// Fan-out metrics recorder.
pub struct FanoutMetrics;

impl FanoutMetrics {
    /// Record a completed side effect.
    pub fn record_completed(sink: FanoutSink) {
        counter!("fanout_completed_total", "sink" => sink.as_str()).increment(1);
    }

    /// Record a failed side effect.
    pub fn record_failure(sink: FanoutSink) {
        counter!("fanout_failures_total", "sink" => sink.as_str()).increment(1);
    }

    /// Record the number of tracked fan-out tasks.
    #[allow(clippy::cast_precision_loss)] // Task counts never approach 2^52
    pub fn record_in_flight(count: usize) {
        gauge!("fanout_in_flight").set(count as f64);
    }
}

/// Listener host metrics recorder.
pub struct ListenerMetrics;

impl ListenerMetrics {
    /// Record a received message.
    pub fn record_received(queue: &str) {
        counter!("listener_messages_received_total", "queue" => queue.to_string()).increment(1);
    }

    /// Record an acknowledged message.
    pub fn record_ack(queue: &str, duration: Duration) {
        counter!("listener_messages_acked_total", "queue" => queue.to_string()).increment(1);
        histogram!("listener_message_duration_seconds", "queue" => queue.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a processed message the broker would not acknowledge.
    pub fn record_ack_failure(queue: &str) {
        counter!("listener_ack_failures_total", "queue" => queue.to_string()).increment(1);
    }

    /// Record a refused message and why.
    pub fn record_nack(queue: &str, reason: &'static str, duration: Duration) {
        counter!(
            "listener_messages_nacked_total",
            "queue" => queue.to_string(),
            "reason" => reason
        )
        .increment(1);
        histogram!("listener_message_duration_seconds", "queue" => queue.to_string())
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[test]
    fn test_metrics_server_start() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());

        let result = server.start();
        assert!(result.is_ok());
    }

    #[test]
    fn recorders_do_not_panic_without_an_installed_recorder() {
        DispatcherMetrics::record_dispatch("TicketPriorityChanged.v1", Duration::from_millis(3));
        DispatcherMetrics::record_failure("TicketPriorityChanged.v1", "priority", "not_found");
        FanoutMetrics::record_failure(FanoutSink::Realtime);
        FanoutMetrics::record_in_flight(2);
        ListenerMetrics::record_nack("ticket-events", "decode", Duration::from_millis(1));
        ListenerMetrics::record_ack_failure("ticket-events");
    }
}
