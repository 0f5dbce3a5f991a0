//! Wiring of the projection pipeline.
//!
//! Everything is assembled by explicit constructor injection:
//!
//! 1. [`connect_stores`] opens the Postgres pool and runs migrations
//! 2. [`connect_broker`] creates the Redpanda event bus
//! 3. [`assemble`] builds the projection context, the dispatcher and the
//!    listener host on top of any stores, bus and realtime transport
//!
//! `assemble` takes trait objects only, so the same wiring runs against the
//! in-memory doubles in tests.

use crate::config::Config;
use std::sync::Arc;
use ticketflow_core::event_bus::{EventBus, EventBusError};
use ticketflow_core::realtime::RealtimeTransport;
use ticketflow_core::store::{AuditStore, PriorityStore, StatusStore, StoreError, TicketStore};
use ticketflow_core::{EventRegistry, PipelineError, TicketEvent};
use ticketflow_projections::postgres::PostgresReadModel;
use ticketflow_projections::{
    IntegrationPublisher, ProjectionContext, RealtimeNotifier, register_ticket_projections,
};
use ticketflow_redpanda::RedpandaEventBus;
use ticketflow_runtime::{Dispatcher, FanoutTracker, ListenerHost};
use tracing::info;

/// The four stores projections read and write.
#[derive(Clone)]
pub struct Stores {
    /// Ticket read model
    pub tickets: Arc<dyn TicketStore>,
    /// Priority reference values
    pub priorities: Arc<dyn PriorityStore>,
    /// Status reference values
    pub statuses: Arc<dyn StatusStore>,
    /// Audit trail
    pub audit: Arc<dyn AuditStore>,
}

/// An assembled, not yet started pipeline.
pub struct Pipeline {
    /// Shared by every projection handler; owns the fan-out tracker.
    pub context: ProjectionContext,
    /// In-process dispatcher with every ticket projection registered.
    pub dispatcher: Arc<Dispatcher<TicketEvent>>,
    /// Broker listener feeding the dispatcher.
    pub listener: ListenerHost<TicketEvent>,
}

impl Pipeline {
    /// Fan-out tasks still running.
    #[must_use]
    pub fn fanout(&self) -> &FanoutTracker {
        &self.context.fanout
    }
}

/// Connect the Postgres read model.
///
/// # Errors
///
/// Returns [`StoreError::Backend`] if the database is unreachable or a
/// migration fails.
pub async fn connect_stores(config: &Config) -> Result<Stores, StoreError> {
    let read_model =
        PostgresReadModel::connect(&config.database.url, config.database.max_connections).await?;
    if config.database.run_migrations {
        read_model.migrate().await?;
        info!("Read-model migrations applied");
    }

    Ok(Stores {
        tickets: Arc::new(read_model.tickets()),
        priorities: Arc::new(read_model.priorities()),
        statuses: Arc::new(read_model.statuses()),
        audit: Arc::new(read_model.audit()),
    })
}

/// Create the Redpanda event bus.
///
/// # Errors
///
/// Returns [`EventBusError::ConnectionFailed`] if the client cannot be
/// created from the broker settings.
pub fn connect_broker(config: &Config) -> Result<RedpandaEventBus, EventBusError> {
    let broker = &config.broker;
    let mut builder = RedpandaEventBus::builder()
        .brokers(&broker.host)
        .sasl(&broker.username, &broker.password)
        .sasl_mechanism(&broker.sasl_mechanism)
        .security_protocol(&broker.security_protocol)
        .consumer_group(&broker.consumer_group);
    if let Some(topic) = &broker.dead_letter_topic {
        builder = builder.dead_letter_topic(topic);
    }
    builder.build()
}

/// Build the projection pipeline.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] if the listener bindings name
/// event types the registry cannot decode.
pub fn assemble(
    config: &Config,
    stores: Stores,
    bus: Arc<dyn EventBus>,
    realtime: Arc<dyn RealtimeTransport>,
) -> Result<Pipeline, PipelineError> {
    let context = ProjectionContext {
        tickets: stores.tickets,
        priorities: stores.priorities,
        statuses: stores.statuses,
        audit: stores.audit,
        notifier: RealtimeNotifier::new(realtime),
        publisher: IntegrationPublisher::new(Arc::clone(&bus), &config.broker.integration_topic),
        fanout: FanoutTracker::new(),
        audit_ids: config.projection.audit_ids,
    };

    let dispatcher = Arc::new(register_ticket_projections(Dispatcher::builder(), &context).build());
    let registry = Arc::new(EventRegistry::ticket_events());
    let listener = ListenerHost::new(
        config.listener_config(),
        bus,
        registry,
        Arc::clone(&dispatcher),
    )?;

    let event_types: Vec<&str> = dispatcher.event_types().collect();
    info!(
        ?event_types,
        integration_topic = %config.broker.integration_topic,
        audit_ids = ?config.projection.audit_ids,
        "Projection pipeline assembled"
    );

    Ok(Pipeline {
        context,
        dispatcher,
        listener,
    })
}
