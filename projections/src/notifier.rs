//! Realtime notifier and the view payloads it pushes.
//!
//! Payloads mirror what the front end reduces into its ticket timeline; all
//! field names are camelCase.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use ticketflow_core::read_model::{Priority, Status, TicketEventRecord};
use ticketflow_core::realtime::{BroadcastReport, RealtimeAction, RealtimeTransport};
use ticketflow_core::{FanoutSink, PipelineError};

/// Timeline entry for a priority change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPriorityEventView {
    /// Audit record id.
    pub id: String,
    /// Ticket id.
    pub ticket_id: String,
    /// When the change happened.
    pub created: DateTime<Utc>,
    /// Who made the change.
    pub user_id: String,
    /// Previous priority.
    pub from_priority: Priority,
    /// New priority.
    pub to_priority: Priority,
}

impl TicketPriorityEventView {
    /// View of `record` moving from `from` to `to`.
    #[must_use]
    pub fn new(record: &TicketEventRecord, from: Priority, to: Priority) -> Self {
        Self {
            id: record.id.to_string(),
            ticket_id: record.ticket_id.to_string(),
            created: record.created,
            user_id: record.user_id.to_string(),
            from_priority: from,
            to_priority: to,
        }
    }
}

/// Timeline entry for a status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusEventView {
    /// Audit record id.
    pub id: String,
    /// Ticket id.
    pub ticket_id: String,
    /// When the change happened.
    pub created: DateTime<Utc>,
    /// Who made the change.
    pub user_id: String,
    /// Previous status.
    pub from_status: Status,
    /// New status.
    pub to_status: Status,
}

impl TicketStatusEventView {
    /// View of `record` moving from `from` to `to`.
    #[must_use]
    pub fn new(record: &TicketEventRecord, from: Status, to: Status) -> Self {
        Self {
            id: record.id.to_string(),
            ticket_id: record.ticket_id.to_string(),
            created: record.created,
            user_id: record.user_id.to_string(),
            from_status: from,
            to_status: to,
        }
    }
}

/// Timeline entry for a new comment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCommentEventView {
    /// Audit record id.
    pub id: String,
    /// Ticket id.
    pub ticket_id: String,
    /// When the comment was added.
    pub created: DateTime<Utc>,
    /// Who added it.
    pub user_id: String,
    /// Comment text.
    pub comment: String,
}

impl TicketCommentEventView {
    /// View of `record` adding `comment`.
    #[must_use]
    pub fn new(record: &TicketEventRecord, comment: String) -> Self {
        Self {
            id: record.id.to_string(),
            ticket_id: record.ticket_id.to_string(),
            created: record.created,
            user_id: record.user_id.to_string(),
            comment,
        }
    }
}

/// Pushes realtime actions to every connected client.
///
/// Best-effort: nothing is stored, and clients that are not connected never
/// see the action.
#[derive(Clone)]
pub struct RealtimeNotifier {
    transport: Arc<dyn RealtimeTransport>,
}

impl RealtimeNotifier {
    /// Notifier broadcasting over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self { transport }
    }

    /// Broadcast `action` to all connected clients.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fanout`] for the realtime sink if the payload
    /// cannot be encoded or the transport refuses the broadcast.
    pub async fn notify<T>(
        &self,
        action: &RealtimeAction<T>,
    ) -> Result<BroadcastReport, PipelineError>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_value(&action.payload).map_err(|e| realtime_failure(&e))?;
        let report = self
            .transport
            .broadcast(&action.action_type, payload)
            .await
            .map_err(|e| realtime_failure(&e))?;

        if report.dropped > 0 {
            tracing::debug!(
                action_type = %action.action_type,
                delivered = report.delivered,
                dropped = report.dropped,
                "Dropped slow realtime clients"
            );
        }
        Ok(report)
    }
}

fn realtime_failure(error: &impl std::fmt::Display) -> PipelineError {
    PipelineError::Fanout {
        sink: FanoutSink::Realtime,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use ticketflow_core::read_model::{AuditChange, AuditIdStrategy};
    use ticketflow_core::realtime::{RealtimeError, action_types};
    use ticketflow_testing::RecordingRealtime;
    use ticketflow_testing::mocks::{self, fixed_time};

    fn record() -> TicketEventRecord {
        let metadata = mocks::metadata("T1", fixed_time());
        TicketEventRecord::new(
            AuditIdStrategy::PerEvent.assign(&metadata),
            &metadata,
            AuditChange::Priority {
                from: mocks::priority_low(),
                to: mocks::priority_high(),
            },
        )
    }

    #[test]
    fn priority_view_is_camel_case() {
        let view =
            TicketPriorityEventView::new(&record(), mocks::priority_low(), mocks::priority_high());
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["ticketId"], "T1");
        assert_eq!(value["userId"], "U1");
        assert_eq!(value["fromPriority"]["name"], "Low");
        assert_eq!(value["toPriority"]["id"], "P2");
        assert_eq!(value["created"], "2025-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn notify_broadcasts_the_encoded_payload() {
        let realtime = RecordingRealtime::new();
        let notifier = RealtimeNotifier::new(Arc::new(realtime.clone()));
        let view = TicketCommentEventView::new(&record(), "hello".to_string());

        let report = notifier
            .notify(&RealtimeAction::new(action_types::ADD_TICKET_COMMENT, view))
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        let payloads = realtime.payloads_of(action_types::ADD_TICKET_COMMENT);
        assert_eq!(payloads[0]["comment"], "hello");
    }

    #[tokio::test]
    async fn transport_failure_is_a_realtime_fanout_error() {
        let realtime = RecordingRealtime::new();
        realtime.fail_with(Some(RealtimeError::Unavailable("closed".to_string())));
        let notifier = RealtimeNotifier::new(Arc::new(realtime));

        let result = notifier
            .notify(&RealtimeAction::new("ANY", serde_json::json!({})))
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::Fanout {
                sink: FanoutSink::Realtime,
                ..
            })
        ));
    }
}
