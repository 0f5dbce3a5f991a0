//! # Ticketflow Projections
//!
//! Projection handlers keeping the ticket read model current, plus the two
//! fan-out sinks they feed and the Postgres adapters behind the stores.
//!
//! Every handler follows the same four steps:
//!
//! 1. **Fetch** the ticket and the referenced values concurrently
//! 2. **Build** the updated ticket and a new audit record
//! 3. **Persist** both, waiting for both writes ([`wait_all`])
//! 4. **Fan out** a realtime action and an integration message, each on its
//!    own tracked task ([`FanoutTracker::spawn_logged`])
//!
//! A failure in 1 or 3 aborts the handler before anything is sent. A failure
//! in 4 is logged and counted and never undoes 3.
//!
//! ```text
//!            ┌── tickets.find ─┐
//! event ──►  ├── from.find ────┼──► build ──► wait_all(update, add) ──┬─► realtime
//!            └── to.find ──────┘                                      └─► integration
//! ```
//!
//! [`wait_all`]: ticketflow_runtime::wait_all

use serde::Serialize;
use std::sync::Arc;
use ticketflow_core::event::{TicketCommentAdded, TicketPriorityChanged, TicketStatusChanged};
use ticketflow_core::integration::IntegrationEvent;
use ticketflow_core::read_model::{AuditIdStrategy, TicketEventRecord};
use ticketflow_core::realtime::RealtimeAction;
use ticketflow_core::store::{AuditStore, PriorityStore, StatusStore, TicketStore};
use ticketflow_core::{FanoutSink, TicketEvent};
use ticketflow_runtime::{DispatcherBuilder, FanoutTracker};

pub mod comment;
pub mod notifier;
pub mod postgres;
pub mod priority;
pub mod publisher;
pub mod status;

pub use comment::CommentAddedHandler;
pub use notifier::RealtimeNotifier;
pub use priority::PriorityChangedHandler;
pub use publisher::IntegrationPublisher;
pub use status::StatusChangedHandler;

/// Everything a projection handler needs, injected at construction.
#[derive(Clone)]
pub struct ProjectionContext {
    /// Ticket read model.
    pub tickets: Arc<dyn TicketStore>,
    /// Priority reference values.
    pub priorities: Arc<dyn PriorityStore>,
    /// Status reference values.
    pub statuses: Arc<dyn StatusStore>,
    /// Audit trail.
    pub audit: Arc<dyn AuditStore>,
    /// Realtime sink.
    pub notifier: RealtimeNotifier,
    /// Integration sink.
    pub publisher: IntegrationPublisher,
    /// Tracks fan-out tasks so shutdown can drain them.
    pub fanout: FanoutTracker,
    /// How audit record ids are assigned.
    pub audit_ids: AuditIdStrategy,
}

impl ProjectionContext {
    /// Spawn both fan-out sinks for a committed `record`.
    ///
    /// Must only be called once persistence for the event has completed.
    pub fn fan_out<V, M>(&self, record: &TicketEventRecord, action: RealtimeAction<V>, message: M)
    where
        V: Serialize + Send + Sync + 'static,
        M: IntegrationEvent + 'static,
    {
        let audit_id = record.id.to_string();

        let notifier = self.notifier.clone();
        self.fanout
            .spawn_logged(FanoutSink::Realtime, audit_id.clone(), async move {
                notifier.notify(&action).await.map(|_| ())
            });

        let publisher = self.publisher.clone();
        self.fanout
            .spawn_logged(FanoutSink::Integration, audit_id, async move {
                publisher.publish(&message).await
            });
    }
}

/// Route every ticket projection on `builder`.
#[must_use]
pub fn register_ticket_projections(
    builder: DispatcherBuilder<TicketEvent>,
    context: &ProjectionContext,
) -> DispatcherBuilder<TicketEvent> {
    builder
        .route(
            TicketPriorityChanged::EVENT_TYPE,
            Arc::new(PriorityChangedHandler::new(context.clone())),
        )
        .route(
            TicketStatusChanged::EVENT_TYPE,
            Arc::new(StatusChangedHandler::new(context.clone())),
        )
        .route(
            TicketCommentAdded::EVENT_TYPE,
            Arc::new(CommentAddedHandler::new(context.clone())),
        )
}
