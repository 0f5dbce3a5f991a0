//! Projection of comments added to a ticket.
//!
//! The ticket document itself does not change; only the audit trail grows.

use crate::notifier::TicketCommentEventView;
use crate::{ProjectionContext, publisher};
use ticketflow_core::event::TicketCommentAdded;
use ticketflow_core::read_model::{AuditChange, TicketEventRecord};
use ticketflow_core::realtime::{RealtimeAction, action_types};
use ticketflow_core::{Event, PipelineError, TicketEvent};
use ticketflow_runtime::{EventHandler, HandlerFuture};

/// Applies [`TicketCommentAdded`] to the audit trail.
#[derive(Clone)]
pub struct CommentAddedHandler {
    context: ProjectionContext,
}

impl CommentAddedHandler {
    /// Handler name in logs and dispatch reports.
    pub const NAME: &'static str = "ticket-comment-projection";

    /// Create the handler.
    #[must_use]
    pub const fn new(context: ProjectionContext) -> Self {
        Self { context }
    }

    /// Append the comment's audit record, then fan out.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the ticket is missing
    /// - [`PipelineError::Persistence`] if the audit store fails
    #[tracing::instrument(
        name = "comment_added",
        skip_all,
        fields(event_id = %event.metadata.event_id, ticket_id = %event.metadata.aggregate_id)
    )]
    pub async fn apply(
        &self,
        event: &TicketCommentAdded,
    ) -> Result<TicketEventRecord, PipelineError> {
        let ctx = &self.context;
        let ticket = ctx.tickets.find(&event.metadata.ticket_id()).await?;

        let record = TicketEventRecord::new(
            ctx.audit_ids.assign(&event.metadata),
            &event.metadata,
            AuditChange::Comment {
                text: event.comment.clone(),
            },
        );

        ctx.audit.add(&record).await?;
        tracing::info!(audit_id = %record.id, "Ticket comment projected");

        ctx.fan_out(
            &record,
            RealtimeAction::new(
                action_types::ADD_TICKET_COMMENT,
                TicketCommentEventView::new(&record, event.comment.clone()),
            ),
            publisher::comment_message(&ticket, &record, &event.comment),
        );

        Ok(record)
    }
}

impl EventHandler<TicketEvent> for CommentAddedHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, event: &'a TicketEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            if let TicketEvent::CommentAdded(event) = event {
                self.apply(event).await.map(|_| ())
            } else {
                tracing::debug!(event_type = event.event_type(), "Ignoring event");
                Ok(())
            }
        })
    }
}
