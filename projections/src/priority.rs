//! Projection of ticket priority changes.

use crate::notifier::TicketPriorityEventView;
use crate::{ProjectionContext, publisher};
use ticketflow_core::event::TicketPriorityChanged;
use ticketflow_core::read_model::{AuditChange, TicketEventRecord};
use ticketflow_core::realtime::{RealtimeAction, action_types};
use ticketflow_core::{Event, PipelineError, TicketEvent};
use ticketflow_runtime::{EventHandler, HandlerFuture, wait_all};

/// Applies [`TicketPriorityChanged`] to the read model.
#[derive(Clone)]
pub struct PriorityChangedHandler {
    context: ProjectionContext,
}

impl PriorityChangedHandler {
    /// Handler name in logs and dispatch reports.
    pub const NAME: &'static str = "ticket-priority-projection";

    /// Create the handler.
    #[must_use]
    pub const fn new(context: ProjectionContext) -> Self {
        Self { context }
    }

    /// Replace the ticket's priority, append the audit record, then fan out.
    ///
    /// Returns the stored audit record. Fan-out runs detached and is not
    /// finished when this returns.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the ticket or either priority is missing
    /// - [`PipelineError::Persistence`] if a store fails; nothing is fanned out
    #[tracing::instrument(
        name = "priority_changed",
        skip_all,
        fields(event_id = %event.metadata.event_id, ticket_id = %event.metadata.aggregate_id)
    )]
    pub async fn apply(
        &self,
        event: &TicketPriorityChanged,
    ) -> Result<TicketEventRecord, PipelineError> {
        let ctx = &self.context;
        let ticket_id = event.metadata.ticket_id();

        let (ticket, from, to) = tokio::try_join!(
            ctx.tickets.find(&ticket_id),
            ctx.priorities.find(&event.from_priority_id),
            ctx.priorities.find(&event.to_priority_id),
        )?;

        let updated = ticket.with_priority(to.clone());
        let record = TicketEventRecord::new(
            ctx.audit_ids.assign(&event.metadata),
            &event.metadata,
            AuditChange::Priority {
                from: from.clone(),
                to: to.clone(),
            },
        );

        wait_all(ctx.tickets.update(&updated), ctx.audit.add(&record)).await?;
        tracing::info!(
            audit_id = %record.id,
            from = %from.id,
            to = %to.id,
            "Ticket priority projected"
        );

        ctx.fan_out(
            &record,
            RealtimeAction::new(
                action_types::ADD_TICKET_PRIORITY_UPDATE,
                TicketPriorityEventView::new(&record, from, to),
            ),
            publisher::priority_message(&updated, &record),
        );

        Ok(record)
    }
}

impl EventHandler<TicketEvent> for PriorityChangedHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, event: &'a TicketEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            if let TicketEvent::PriorityChanged(event) = event {
                self.apply(event).await.map(|_| ())
            } else {
                tracing::debug!(event_type = event.event_type(), "Ignoring event");
                Ok(())
            }
        })
    }
}
