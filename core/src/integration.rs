//! Integration messages published for other services.
//!
//! Integration messages are a public contract. They contain only primitive,
//! stable fields (string ids, names, ISO-8601 timestamps) and never expose
//! internal identifier types or enums. Each message type is frozen per
//! version: adding fields is backward compatible, renaming or removing them is
//! not and requires a new [`IntegrationEvent::VERSION`].

use crate::event::EventError;
use crate::event_bus::OutboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned message other services consume.
pub trait IntegrationEvent: Serialize + Send + Sync {
    /// Stable message type name.
    const MESSAGE_TYPE: &'static str;

    /// Schema version of this message type.
    const VERSION: u32;

    /// Partitioning key; messages about the same ticket stay ordered.
    fn partition_key(&self) -> &str;

    /// Encode into a broker message (JSON body).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    fn to_message(&self) -> Result<OutboundMessage, EventError> {
        let payload =
            serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))?;
        Ok(OutboundMessage {
            message_type: Self::MESSAGE_TYPE.to_string(),
            version: Self::VERSION,
            key: Some(self.partition_key().to_string()),
            payload,
        })
    }
}

/// A ticket's priority changed (v1).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPriorityIntegrationEvent {
    /// New priority id.
    pub priority_id: String,
    /// New priority display name.
    pub priority_name: String,
    /// Ticket id.
    pub ticket_id: String,
    /// Ticket title.
    pub ticket_title: String,
    /// Audit record id of the change.
    pub event_id: String,
    /// When the change happened.
    pub created: DateTime<Utc>,
    /// Who made the change.
    pub user_id: String,
}

impl IntegrationEvent for TicketPriorityIntegrationEvent {
    const MESSAGE_TYPE: &'static str = "TicketPriorityIntegrationEvent";
    const VERSION: u32 = 1;

    fn partition_key(&self) -> &str {
        &self.ticket_id
    }
}

/// A ticket's status changed (v1).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusIntegrationEvent {
    /// New status id.
    pub status_id: String,
    /// New status display name.
    pub status_name: String,
    /// Ticket id.
    pub ticket_id: String,
    /// Ticket title.
    pub ticket_title: String,
    /// Audit record id of the change.
    pub event_id: String,
    /// When the change happened.
    pub created: DateTime<Utc>,
    /// Who made the change.
    pub user_id: String,
}

impl IntegrationEvent for TicketStatusIntegrationEvent {
    const MESSAGE_TYPE: &'static str = "TicketStatusIntegrationEvent";
    const VERSION: u32 = 1;

    fn partition_key(&self) -> &str {
        &self.ticket_id
    }
}

/// A comment was added to a ticket (v1).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCommentIntegrationEvent {
    /// Ticket id.
    pub ticket_id: String,
    /// Ticket title.
    pub ticket_title: String,
    /// Audit record id of the comment.
    pub event_id: String,
    /// Comment text.
    pub comment: String,
    /// When the comment was added.
    pub created: DateTime<Utc>,
    /// Who added the comment.
    pub user_id: String,
}

impl IntegrationEvent for TicketCommentIntegrationEvent {
    const MESSAGE_TYPE: &'static str = "TicketCommentIntegrationEvent";
    const VERSION: u32 = 1;

    fn partition_key(&self) -> &str {
        &self.ticket_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)]
    fn priority_message_has_the_published_wire_shape() {
        let message = TicketPriorityIntegrationEvent {
            priority_id: "P2".to_string(),
            priority_name: "High".to_string(),
            ticket_id: "T1".to_string(),
            ticket_title: "Printer on fire".to_string(),
            event_id: "e-1".to_string(),
            created: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("valid timestamp")
                .with_timezone(&Utc),
            user_id: "U1".to_string(),
        };

        let outbound = message.to_message().expect("encoding should succeed");
        let value: serde_json::Value =
            serde_json::from_slice(&outbound.payload).expect("payload is JSON");

        let mut keys: Vec<&str> = value
            .as_object()
            .expect("payload is an object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "created",
                "eventId",
                "priorityId",
                "priorityName",
                "ticketId",
                "ticketTitle",
                "userId"
            ]
        );
        assert_eq!(value["created"], "2025-01-01T00:00:00Z");
        assert_eq!(outbound.message_type, "TicketPriorityIntegrationEvent");
        assert_eq!(outbound.version, 1);
        assert_eq!(outbound.key.as_deref(), Some("T1"));
    }
}
