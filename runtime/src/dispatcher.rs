//! In-process notification dispatcher.
//!
//! The dispatcher maps an event-type identifier to the ordered list of
//! handlers registered for it. The mapping is built once at startup with a
//! [`DispatcherBuilder`] and never changes afterwards.
//!
//! # Isolation
//!
//! Every handler of an event runs in its own Tokio task. A handler that
//! returns an error or panics is logged and counted, and shows up in the
//! [`DispatchReport`]; it never affects its siblings and is never propagated to
//! whoever raised the event.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder()
//!     .route(TicketPriorityChanged::EVENT_TYPE, priority_handler)
//!     .build();
//!
//! let report = dispatcher.dispatch(event).await;
//! assert!(report.is_success());
//! ```

use crate::metrics::DispatcherMetrics;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use ticketflow_core::{Event, PipelineError};

/// Boxed future returned by [`EventHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

/// A component reacting to one or more event types.
///
/// Handlers are registered per event type; the same handler value may be
/// routed from several types.
pub trait EventHandler<E>: Send + Sync {
    /// Stable name used in logs, metrics and [`DispatchReport`]s.
    fn name(&self) -> &str;

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] that aborted handling.
    fn handle<'a>(&'a self, event: &'a E) -> HandlerFuture<'a>;
}

/// Result of one handler invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Handler name.
    pub handler: String,
    /// What the handler returned (panics become [`PipelineError::HandlerPanicked`]).
    pub result: Result<(), PipelineError>,
}

/// Outcome of dispatching one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    /// Event-type identifier that was dispatched.
    pub event_type: &'static str,
    /// One entry per registered handler, in registration order.
    pub outcomes: Vec<HandlerOutcome>,
}

impl DispatchReport {
    /// `true` when every handler succeeded (vacuously true with no handlers).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// `true` when no handler was registered for the event.
    #[must_use]
    pub fn is_unhandled(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Handlers that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.handler.as_str(), e)))
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self
            .failures()
            .map(|(handler, error)| format!("{handler}: {error}"))
            .collect();
        if failed.is_empty() {
            write!(f, "{} handled by {} handler(s)", self.event_type, self.outcomes.len())
        } else {
            write!(
                f,
                "{} failed in {} of {} handler(s): {}",
                self.event_type,
                failed.len(),
                self.outcomes.len(),
                failed.join("; ")
            )
        }
    }
}

type Routes<E> = HashMap<&'static str, Vec<Arc<dyn EventHandler<E>>>>;

/// Builder for a [`Dispatcher`].
pub struct DispatcherBuilder<E> {
    routes: Routes<E>,
}

impl<E: Event> DispatcherBuilder<E> {
    /// Route `event_type` to `handler`, after any handler already routed.
    #[must_use]
    pub fn route(mut self, event_type: &'static str, handler: Arc<dyn EventHandler<E>>) -> Self {
        self.routes.entry(event_type).or_default().push(handler);
        self
    }

    /// Freeze the routing table.
    #[must_use]
    pub fn build(self) -> Dispatcher<E> {
        Dispatcher {
            routes: self.routes,
        }
    }
}

/// Invokes every handler registered for an event's type.
pub struct Dispatcher<E> {
    routes: Routes<E>,
}

impl<E: Event> Dispatcher<E> {
    /// Start building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder<E> {
        DispatcherBuilder {
            routes: HashMap::new(),
        }
    }

    /// Event types with at least one handler.
    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.routes.keys().copied()
    }

    /// Number of handlers registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes.get(event_type).map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's type and wait for all of
    /// them.
    ///
    /// Handlers run concurrently, each on its own task. Errors and panics are
    /// collected into the returned report.
    pub async fn dispatch(&self, event: E) -> DispatchReport {
        let event_type = event.event_type();
        let Some(handlers) = self.routes.get(event_type) else {
            tracing::debug!(event_type, "No handler registered for event");
            DispatcherMetrics::record_unhandled(event_type);
            return DispatchReport {
                event_type,
                outcomes: Vec::new(),
            };
        };

        let start = Instant::now();
        let event_id = event.metadata().event_id.to_string();
        let event = Arc::new(event);

        let tasks: Vec<_> = handlers
            .iter()
            .map(|handler| {
                let handler = Arc::clone(handler);
                let event = Arc::clone(&event);
                let name = handler.name().to_string();
                (name, tokio::spawn(async move { handler.handle(&event).await }))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(join_error) => Err(PipelineError::HandlerPanicked {
                    handler: name.clone(),
                    reason: if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "task cancelled".to_string()
                    },
                }),
            };

            if let Err(error) = &result {
                tracing::error!(
                    event_type,
                    event_id = %event_id,
                    handler = %name,
                    error = %error,
                    "Event handler failed"
                );
                DispatcherMetrics::record_failure(event_type, &name, error.kind());
            }

            outcomes.push(HandlerOutcome {
                handler: name,
                result,
            });
        }

        DispatcherMetrics::record_dispatch(event_type, start.elapsed());
        tracing::debug!(
            event_type,
            event_id = %event_id,
            handlers = outcomes.len(),
            "Event dispatched"
        );

        DispatchReport {
            event_type,
            outcomes,
        }
    }
}

impl<E> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: HashMap<&str, Vec<&str>> = self
            .routes
            .iter()
            .map(|(event_type, handlers)| {
                (*event_type, handlers.iter().map(|h| h.name()).collect())
            })
            .collect();
        f.debug_struct("Dispatcher").field("routes", &routes).finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ticketflow_core::event::{TicketCommentAdded, TicketPriorityChanged};
    use ticketflow_core::types::{AggregateId, PriorityId, UserId};
    use ticketflow_core::{EventMetadata, TicketEvent};

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl EventHandler<TicketEvent> for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn handle<'a>(&'a self, _event: &'a TicketEvent) -> HandlerFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct Failing;

    impl EventHandler<TicketEvent> for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn handle<'a>(&'a self, _event: &'a TicketEvent) -> HandlerFuture<'a> {
            Box::pin(async {
                Err(PipelineError::Persistence("disk full".to_string()))
            })
        }
    }

    struct Panicking;

    impl EventHandler<TicketEvent> for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn handle<'a>(&'a self, _event: &'a TicketEvent) -> HandlerFuture<'a> {
            Box::pin(async { explode() })
        }
    }

    fn explode() -> Result<(), PipelineError> {
        panic!("boom")
    }

    fn priority_event() -> TicketEvent {
        TicketPriorityChanged {
            metadata: EventMetadata::new(AggregateId::new("T1"), UserId::new("U1"), Utc::now()),
            from_priority_id: PriorityId::new("P1"),
            to_priority_id: PriorityId::new("P2"),
        }
        .into()
    }

    fn comment_event() -> TicketEvent {
        TicketCommentAdded {
            metadata: EventMetadata::new(AggregateId::new("T1"), UserId::new("U1"), Utc::now()),
            comment: "hello".to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn dispatch_invokes_only_handlers_of_the_event_type() {
        let priority = Counting::new("priority");
        let comment = Counting::new("comment");
        let dispatcher = Dispatcher::builder()
            .route(TicketPriorityChanged::EVENT_TYPE, priority.clone())
            .route(TicketCommentAdded::EVENT_TYPE, comment.clone())
            .build();

        let report = dispatcher.dispatch(priority_event()).await;

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(priority.calls.load(Ordering::SeqCst), 1);
        assert_eq!(comment.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn event_without_handlers_is_a_no_op() {
        let dispatcher = Dispatcher::builder()
            .route(TicketPriorityChanged::EVENT_TYPE, Counting::new("priority"))
            .build();

        let report = dispatcher.dispatch(comment_event()).await;

        assert!(report.is_unhandled());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn failing_and_panicking_handlers_do_not_affect_siblings() {
        let survivor = Counting::new("survivor");
        let dispatcher = Dispatcher::builder()
            .route(TicketPriorityChanged::EVENT_TYPE, Arc::new(Failing))
            .route(TicketPriorityChanged::EVENT_TYPE, Arc::new(Panicking))
            .route(TicketPriorityChanged::EVENT_TYPE, survivor.clone())
            .build();

        let report = dispatcher.dispatch(priority_event()).await;

        assert!(!report.is_success());
        assert_eq!(survivor.calls.load(Ordering::SeqCst), 1);

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, "failing");
        assert_eq!(failures[0].1.kind(), "persistence");
        assert_eq!(
            failures[1].1,
            &PipelineError::HandlerPanicked {
                handler: "panicking".to_string(),
                reason: "boom".to_string()
            }
        );
        assert!(report.to_string().contains("2 of 3"));
    }

    #[test]
    fn debug_lists_routes() {
        let dispatcher = Dispatcher::builder()
            .route(TicketPriorityChanged::EVENT_TYPE, Counting::new("priority"))
            .build();

        assert_eq!(dispatcher.handler_count(TicketPriorityChanged::EVENT_TYPE), 1);
        assert_eq!(dispatcher.handler_count(TicketCommentAdded::EVENT_TYPE), 0);
        assert!(format!("{dispatcher:?}").contains("priority"));
    }

    proptest! {
        #[test]
        fn every_registered_handler_runs_exactly_once(handler_count in 0usize..8) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let handlers: Vec<Arc<Counting>> =
                (0..handler_count).map(|_| Counting::new("counting")).collect();

            let dispatcher = handlers
                .iter()
                .fold(Dispatcher::builder(), |builder, handler| {
                    builder.route(TicketPriorityChanged::EVENT_TYPE, handler.clone())
                })
                .build();

            let report = runtime.block_on(dispatcher.dispatch(priority_event()));

            prop_assert_eq!(report.outcomes.len(), handler_count);
            for handler in &handlers {
                prop_assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
            }
        }
    }
}
