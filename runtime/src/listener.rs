//! Broker listener host.
//!
//! The listener host bridges messages published on the external broker back
//! into the in-process [`Dispatcher`]. It owns one receive endpoint per
//! configured [`QueueBinding`]; each endpoint holds its own subscription and
//! runs on its own task.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──► Running ──stop()──► Stopping ──► Stopped
//!    │                                                   ▲
//!    └────────── start() fails to subscribe ─────────────┘
//! ```
//!
//! # Per-Message Handling
//!
//! 1. Reject (nack) messages whose declared type is not bound to the queue
//! 2. Decode the payload through the [`EventRegistry`]; nack on failure
//! 3. Dispatch the event and wait for every handler
//! 4. Ack if every handler succeeded, nack otherwise
//!
//! The host never retries by itself; redelivery and dead-lettering are the
//! broker client's policy. A bad message never stops its endpoint.
//!
//! # Shutdown
//!
//! [`ListenerHost::stop`] stops pulling new messages, releases the
//! subscriptions, and waits (bounded by [`ListenerConfig::shutdown_timeout`])
//! for in-flight messages to be settled.

use crate::dispatcher::Dispatcher;
use crate::metrics::ListenerMetrics;
use futures::StreamExt;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ticketflow_core::event_bus::{Delivery, EventBus, Subscription};
use ticketflow_core::{Event, EventRegistry, PipelineError};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Default number of messages one endpoint handles concurrently.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

/// Default bound on waiting for in-flight messages at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// One queue and the event types its endpoint accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueBinding {
    /// Queue (topic) name.
    pub queue: String,
    /// Event-type identifiers accepted on this queue.
    pub event_types: BTreeSet<String>,
    /// Messages handled concurrently by this endpoint.
    pub max_in_flight: usize,
}

impl QueueBinding {
    /// Bind `queue` to `event_types` with the default concurrency.
    #[must_use]
    pub fn new<I, S>(queue: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: queue.into(),
            event_types: event_types.into_iter().map(Into::into).collect(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Set how many messages this endpoint handles concurrently.
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Whether `event_type` is declared for this queue.
    #[must_use]
    pub fn accepts(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }
}

/// Listener host configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    /// One receive endpoint per binding.
    pub bindings: Vec<QueueBinding>,
    /// Bound on waiting for in-flight messages during [`ListenerHost::stop`].
    pub shutdown_timeout: Duration,
}

impl ListenerConfig {
    /// Configuration with the default shutdown timeout.
    #[must_use]
    pub const fn new(bindings: Vec<QueueBinding>) -> Self {
        Self {
            bindings,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Check the bindings against the event types `registry` can decode.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if there are no bindings, a
    /// queue is bound twice, a binding has no event types or zero concurrency,
    /// or an event type is not registered.
    pub fn validate<E>(&self, registry: &EventRegistry<E>) -> Result<(), PipelineError> {
        if self.bindings.is_empty() {
            return Err(PipelineError::Configuration(
                "listener has no queue bindings".to_string(),
            ));
        }

        let mut queues = HashSet::new();
        for binding in &self.bindings {
            if binding.queue.trim().is_empty() {
                return Err(PipelineError::Configuration(
                    "queue name must not be empty".to_string(),
                ));
            }
            if !queues.insert(binding.queue.as_str()) {
                return Err(PipelineError::Configuration(format!(
                    "queue '{}' is bound more than once",
                    binding.queue
                )));
            }
            if binding.event_types.is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "queue '{}' has no event types",
                    binding.queue
                )));
            }
            if binding.max_in_flight == 0 {
                return Err(PipelineError::Configuration(format!(
                    "queue '{}' must allow at least one message in flight",
                    binding.queue
                )));
            }
            if let Some(unknown) = binding
                .event_types
                .iter()
                .find(|event_type| !registry.contains(event_type))
            {
                return Err(PipelineError::Configuration(format!(
                    "queue '{}' declares unregistered event type '{unknown}'",
                    binding.queue
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a [`ListenerHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostState {
    /// Constructed, not yet started.
    Created,
    /// Endpoints are receiving messages.
    Running,
    /// No new messages are pulled; in-flight messages are finishing.
    Stopping,
    /// Every endpoint has exited. Terminal.
    Stopped,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Message counts of one receive endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Queue the endpoint consumed.
    pub queue: String,
    /// Messages received.
    pub received: u64,
    /// Messages acknowledged.
    pub acked: u64,
    /// Messages refused.
    pub nacked: u64,
    /// Messages processed whose acknowledgement the broker did not accept.
    pub unsettled: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settlement {
    Acked,
    Nacked,
    /// Processed, but the ack failed; the broker will redeliver it.
    Unsettled,
}

struct Endpoint {
    queue: String,
    handle: JoinHandle<EndpointStats>,
}

/// Long-lived host of broker receive endpoints.
pub struct ListenerHost<E> {
    config: ListenerConfig,
    bus: Arc<dyn EventBus>,
    registry: Arc<EventRegistry<E>>,
    dispatcher: Arc<Dispatcher<E>>,
    state: watch::Sender<HostState>,
    shutdown: watch::Sender<bool>,
    endpoints: Vec<Endpoint>,
}

impl<E: Event> ListenerHost<E> {
    /// Create a host in [`HostState::Created`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if `config` is invalid for
    /// `registry`.
    pub fn new(
        config: ListenerConfig,
        bus: Arc<dyn EventBus>,
        registry: Arc<EventRegistry<E>>,
        dispatcher: Arc<Dispatcher<E>>,
    ) -> Result<Self, PipelineError> {
        config.validate(registry.as_ref())?;

        let (state, _) = watch::channel(HostState::Created);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            registry,
            dispatcher,
            state,
            shutdown,
            endpoints: Vec::new(),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<HostState> {
        self.state.subscribe()
    }

    /// Subscribe every binding and start its receive endpoint.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidState`] unless the host is [`HostState::Created`]
    /// - [`PipelineError::Broker`] if a subscription cannot be opened; endpoints
    ///   already started are released and the host ends in [`HostState::Stopped`]
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        let state = self.state();
        if state != HostState::Created {
            return Err(PipelineError::InvalidState(format!(
                "cannot start a listener host that is {state}"
            )));
        }

        for binding in self.config.bindings.clone() {
            match self.bus.subscribe(&binding.queue).await {
                Ok(subscription) => {
                    info!(
                        queue = %binding.queue,
                        event_types = ?binding.event_types,
                        max_in_flight = binding.max_in_flight,
                        "Receive endpoint started"
                    );
                    let queue = binding.queue.clone();
                    let handle = tokio::spawn(run_endpoint(
                        binding,
                        subscription,
                        Arc::clone(&self.registry),
                        Arc::clone(&self.dispatcher),
                        self.shutdown.subscribe(),
                    ));
                    self.endpoints.push(Endpoint { queue, handle });
                }
                Err(e) => {
                    error!(queue = %binding.queue, error = %e, "Failed to subscribe");
                    self.release().await;
                    self.state.send_replace(HostState::Stopped);
                    return Err(e.into());
                }
            }
        }

        self.state.send_replace(HostState::Running);
        info!(endpoints = self.endpoints.len(), "Listener host running");
        Ok(())
    }

    /// Stop all endpoints and wait for in-flight messages.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] unless the host is
    /// [`HostState::Running`].
    pub async fn stop(&mut self) -> Result<Vec<EndpointStats>, PipelineError> {
        let state = self.state();
        if state != HostState::Running {
            return Err(PipelineError::InvalidState(format!(
                "cannot stop a listener host that is {state}"
            )));
        }

        self.state.send_replace(HostState::Stopping);
        info!("Listener host stopping");

        let stats = self.release().await;

        self.state.send_replace(HostState::Stopped);
        info!(
            received = stats.iter().map(|s| s.received).sum::<u64>(),
            acked = stats.iter().map(|s| s.acked).sum::<u64>(),
            nacked = stats.iter().map(|s| s.nacked).sum::<u64>(),
            unsettled = stats.iter().map(|s| s.unsettled).sum::<u64>(),
            "Listener host stopped"
        );
        Ok(stats)
    }

    async fn release(&mut self) -> Vec<EndpointStats> {
        self.shutdown.send_replace(true);

        let timeout = self.config.shutdown_timeout;
        let mut stats = Vec::with_capacity(self.endpoints.len());
        for Endpoint { queue, mut handle } in self.endpoints.drain(..) {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(endpoint_stats)) => stats.push(endpoint_stats),
                Ok(Err(e)) => error!(queue = %queue, error = %e, "Receive endpoint panicked"),
                Err(_) => {
                    warn!(
                        queue = %queue,
                        ?timeout,
                        "Receive endpoint did not drain in time, aborting"
                    );
                    handle.abort();
                }
            }
        }
        stats
    }
}

impl<E> fmt::Debug for ListenerHost<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHost")
            .field("state", &*self.state.borrow())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn run_endpoint<E: Event>(
    binding: QueueBinding,
    mut subscription: Subscription,
    registry: Arc<EventRegistry<E>>,
    dispatcher: Arc<Dispatcher<E>>,
    mut shutdown: watch::Receiver<bool>,
) -> EndpointStats {
    let binding = Arc::new(binding);
    let permits = Arc::new(Semaphore::new(binding.max_in_flight));
    let mut in_flight = JoinSet::new();
    let mut stats = EndpointStats {
        queue: binding.queue.clone(),
        ..EndpointStats::default()
    };

    loop {
        while let Some(joined) = in_flight.try_join_next() {
            record(&mut stats, joined);
        }
        if *shutdown.borrow() {
            break;
        }

        // Wait for capacity before pulling, so at most `max_in_flight`
        // messages are taken off the queue.
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = subscription.next() => next,
        };

        match next {
            Some(Ok(delivery)) => {
                stats.received += 1;
                ListenerMetrics::record_received(&binding.queue);
                let binding = Arc::clone(&binding);
                let registry = Arc::clone(&registry);
                let dispatcher = Arc::clone(&dispatcher);
                in_flight.spawn(async move {
                    let settlement = process(&binding, delivery, &registry, &dispatcher).await;
                    drop(permit);
                    settlement
                });
            }
            Some(Err(e)) => {
                warn!(queue = %binding.queue, error = %e, "Error receiving message");
            }
            None => {
                warn!(queue = %binding.queue, "Subscription ended");
                break;
            }
        }
    }

    drop(subscription);
    debug!(queue = %binding.queue, in_flight = in_flight.len(), "Draining receive endpoint");
    while let Some(joined) = in_flight.join_next().await {
        record(&mut stats, joined);
    }
    info!(
        queue = %stats.queue,
        received = stats.received,
        acked = stats.acked,
        nacked = stats.nacked,
        unsettled = stats.unsettled,
        "Receive endpoint stopped"
    );
    stats
}

fn record(stats: &mut EndpointStats, joined: Result<Settlement, tokio::task::JoinError>) {
    match joined {
        Ok(Settlement::Acked) => stats.acked += 1,
        Ok(Settlement::Nacked) => stats.nacked += 1,
        Ok(Settlement::Unsettled) => stats.unsettled += 1,
        Err(e) => error!(queue = %stats.queue, error = %e, "Message task panicked"),
    }
}

async fn process<E: Event>(
    binding: &QueueBinding,
    delivery: Delivery,
    registry: &EventRegistry<E>,
    dispatcher: &Dispatcher<E>,
) -> Settlement {
    let start = Instant::now();
    let queue = binding.queue.as_str();
    let message_type = delivery.message().message_type.clone();

    if !binding.accepts(&message_type) {
        warn!(queue, message_type = %message_type, "Event type not bound to this queue");
        let reason = format!("event type '{message_type}' is not bound to queue '{queue}'");
        return nack(delivery, queue, "undeclared_type", reason, start).await;
    }

    let event = match registry.decode(&message_type, &delivery.message().payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(queue, message_type = %message_type, error = %e, "Failed to decode message");
            return nack(delivery, queue, "decode", e.to_string(), start).await;
        }
    };

    let report = dispatcher.dispatch(event).await;
    if !report.is_success() {
        return nack(delivery, queue, "handler", report.to_string(), start).await;
    }

    match delivery.ack().await {
        Ok(()) => {
            debug!(queue, message_type = %message_type, "Message acknowledged");
            ListenerMetrics::record_ack(queue, start.elapsed());
            Settlement::Acked
        }
        Err(e) => {
            error!(
                queue,
                message_type = %message_type,
                error = %e,
                "Failed to acknowledge message, leaving it unsettled"
            );
            ListenerMetrics::record_ack_failure(queue);
            Settlement::Unsettled
        }
    }
}

async fn nack(
    delivery: Delivery,
    queue: &str,
    reason_kind: &'static str,
    reason: String,
    start: Instant,
) -> Settlement {
    if let Err(e) = delivery.nack(reason).await {
        error!(queue, error = %e, "Failed to refuse message");
    }
    ListenerMetrics::record_nack(queue, reason_kind, start.elapsed());
    Settlement::Nacked
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::TicketEvent;

    fn registry() -> EventRegistry<TicketEvent> {
        EventRegistry::ticket_events()
    }

    #[test]
    fn binding_defaults_to_one_message_in_flight() {
        let binding = QueueBinding::new("ticket-events", ["TicketPriorityChanged.v1"]);
        assert_eq!(binding.max_in_flight, 1);
        assert!(binding.accepts("TicketPriorityChanged.v1"));
        assert!(!binding.accepts("TicketStatusChanged.v1"));
    }

    #[test]
    fn valid_configuration_passes() {
        let config = ListenerConfig::new(vec![
            QueueBinding::new("priorities", ["TicketPriorityChanged.v1"]),
            QueueBinding::new("other", ["TicketStatusChanged.v1", "TicketCommentAdded.v1"])
                .with_max_in_flight(4),
        ]);
        assert_eq!(config.validate(&registry()), Ok(()));
    }

    #[test]
    fn configuration_errors_are_reported() {
        let cases = vec![
            ListenerConfig::new(vec![]),
            ListenerConfig::new(vec![QueueBinding::new("", ["TicketPriorityChanged.v1"])]),
            ListenerConfig::new(vec![QueueBinding::new("q", Vec::<String>::new())]),
            ListenerConfig::new(vec![
                QueueBinding::new("q", ["TicketPriorityChanged.v1"]).with_max_in_flight(0),
            ]),
            ListenerConfig::new(vec![QueueBinding::new("q", ["Unknown.v1"])]),
            ListenerConfig::new(vec![
                QueueBinding::new("q", ["TicketPriorityChanged.v1"]),
                QueueBinding::new("q", ["TicketStatusChanged.v1"]),
            ]),
        ];

        for config in cases {
            let result = config.validate(&registry());
            assert!(
                matches!(result, Err(PipelineError::Configuration(_))),
                "expected configuration error for {config:?}"
            );
        }
    }

    #[test]
    fn host_state_display() {
        assert_eq!(HostState::Stopping.to_string(), "stopping");
    }
}
