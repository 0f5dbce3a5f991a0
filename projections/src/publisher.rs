//! Integration publisher.
//!
//! Maps committed read-model state onto the versioned integration messages
//! and hands them to the broker. Delivery guarantees beyond "the broker
//! accepted it" belong to the broker client.

use std::sync::Arc;
use ticketflow_core::event_bus::EventBus;
use ticketflow_core::integration::{
    IntegrationEvent, TicketCommentIntegrationEvent, TicketPriorityIntegrationEvent,
    TicketStatusIntegrationEvent,
};
use ticketflow_core::read_model::{Ticket, TicketEventRecord};
use ticketflow_core::{FanoutSink, PipelineError};

/// Publishes integration messages on one topic.
#[derive(Clone)]
pub struct IntegrationPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl IntegrationPublisher {
    /// Publisher sending to `topic` over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode and publish `message`, keyed by its ticket id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fanout`] for the integration sink if encoding
    /// fails or the broker does not accept the message.
    pub async fn publish<M: IntegrationEvent>(&self, message: &M) -> Result<(), PipelineError> {
        let outbound = message.to_message().map_err(|e| integration_failure(&e))?;
        self.bus
            .publish(&self.topic, &outbound)
            .await
            .map_err(|e| integration_failure(&e))?;

        tracing::debug!(
            topic = %self.topic,
            message_type = M::MESSAGE_TYPE,
            version = M::VERSION,
            key = message.partition_key(),
            "Integration message published"
        );
        Ok(())
    }
}

fn integration_failure(error: &impl std::fmt::Display) -> PipelineError {
    PipelineError::Fanout {
        sink: FanoutSink::Integration,
        reason: error.to_string(),
    }
}

/// Priority message for `ticket` after the change recorded in `record`.
#[must_use]
pub fn priority_message(
    ticket: &Ticket,
    record: &TicketEventRecord,
) -> TicketPriorityIntegrationEvent {
    TicketPriorityIntegrationEvent {
        priority_id: ticket.priority.id.to_string(),
        priority_name: ticket.priority.name.clone(),
        ticket_id: ticket.id.to_string(),
        ticket_title: ticket.title.clone(),
        event_id: record.id.to_string(),
        created: record.created,
        user_id: record.user_id.to_string(),
    }
}

/// Status message for `ticket` after the change recorded in `record`.
#[must_use]
pub fn status_message(ticket: &Ticket, record: &TicketEventRecord) -> TicketStatusIntegrationEvent {
    TicketStatusIntegrationEvent {
        status_id: ticket.status.id.to_string(),
        status_name: ticket.status.name.clone(),
        ticket_id: ticket.id.to_string(),
        ticket_title: ticket.title.clone(),
        event_id: record.id.to_string(),
        created: record.created,
        user_id: record.user_id.to_string(),
    }
}

/// Comment message for `ticket`.
#[must_use]
pub fn comment_message(
    ticket: &Ticket,
    record: &TicketEventRecord,
    comment: &str,
) -> TicketCommentIntegrationEvent {
    TicketCommentIntegrationEvent {
        ticket_id: ticket.id.to_string(),
        ticket_title: ticket.title.clone(),
        event_id: record.id.to_string(),
        comment: comment.to_string(),
        created: record.created,
        user_id: record.user_id.to_string(),
    }
}
