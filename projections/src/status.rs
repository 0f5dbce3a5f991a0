//! Projection of ticket status changes.

use crate::notifier::TicketStatusEventView;
use crate::{ProjectionContext, publisher};
use ticketflow_core::event::TicketStatusChanged;
use ticketflow_core::read_model::{AuditChange, TicketEventRecord};
use ticketflow_core::realtime::{RealtimeAction, action_types};
use ticketflow_core::{Event, PipelineError, TicketEvent};
use ticketflow_runtime::{EventHandler, HandlerFuture, wait_all};

/// Applies [`TicketStatusChanged`] to the read model.
#[derive(Clone)]
pub struct StatusChangedHandler {
    context: ProjectionContext,
}

impl StatusChangedHandler {
    /// Handler name in logs and dispatch reports.
    pub const NAME: &'static str = "ticket-status-projection";

    /// Create the handler.
    #[must_use]
    pub const fn new(context: ProjectionContext) -> Self {
        Self { context }
    }

    /// Replace the ticket's status, append the audit record, then fan out.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the ticket or either status is missing
    /// - [`PipelineError::Persistence`] if a store fails; nothing is fanned out
    #[tracing::instrument(
        name = "status_changed",
        skip_all,
        fields(event_id = %event.metadata.event_id, ticket_id = %event.metadata.aggregate_id)
    )]
    pub async fn apply(
        &self,
        event: &TicketStatusChanged,
    ) -> Result<TicketEventRecord, PipelineError> {
        let ctx = &self.context;
        let ticket_id = event.metadata.ticket_id();

        let (ticket, from, to) = tokio::try_join!(
            ctx.tickets.find(&ticket_id),
            ctx.statuses.find(&event.from_status_id),
            ctx.statuses.find(&event.to_status_id),
        )?;

        let updated = ticket.with_status(to.clone());
        let record = TicketEventRecord::new(
            ctx.audit_ids.assign(&event.metadata),
            &event.metadata,
            AuditChange::Status {
                from: from.clone(),
                to: to.clone(),
            },
        );

        wait_all(ctx.tickets.update(&updated), ctx.audit.add(&record)).await?;
        tracing::info!(
            audit_id = %record.id,
            from = %from.id,
            to = %to.id,
            "Ticket status projected"
        );

        ctx.fan_out(
            &record,
            RealtimeAction::new(
                action_types::ADD_TICKET_STATUS_UPDATE,
                TicketStatusEventView::new(&record, from, to),
            ),
            publisher::status_message(&updated, &record),
        );

        Ok(record)
    }
}

impl EventHandler<TicketEvent> for StatusChangedHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, event: &'a TicketEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            if let TicketEvent::StatusChanged(event) = event {
                self.apply(event).await.map(|_| ())
            } else {
                tracing::debug!(event_type = event.event_type(), "Ignoring event");
                Ok(())
            }
        })
    }
}
