//! Domain events consumed by the projection pipeline.
//!
//! Events represent facts about ticket changes that already happened on the
//! write side. They are immutable once constructed and live for a single
//! dispatch cycle inside this process.
//!
//! # Wire format
//!
//! Events cross process boundaries (the broker listener receives events
//! published by other services) as camelCase JSON. The event type travels next
//! to the payload as a stable, versioned identifier such as
//! `"TicketPriorityChanged.v1"`; the [`EventRegistry`](crate::registry::EventRegistry)
//! uses it to pick the decoder.
//!
//! # Example
//!
//! ```
//! use ticketflow_core::event::{Event, EventMetadata, TicketEvent, TicketPriorityChanged};
//! use ticketflow_core::types::{AggregateId, PriorityId, UserId};
//! use chrono::Utc;
//!
//! let event = TicketEvent::PriorityChanged(TicketPriorityChanged {
//!     metadata: EventMetadata::new(AggregateId::new("T1"), UserId::new("U1"), Utc::now()),
//!     from_priority_id: PriorityId::new("P1"),
//!     to_priority_id: PriorityId::new("P2"),
//! });
//!
//! assert_eq!(event.event_type(), "TicketPriorityChanged.v1");
//! ```

use crate::types::{AggregateId, EventId, PriorityId, StatusId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Error types for event encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event that can be routed through the dispatcher.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable identifier with a version suffix so the
/// schema can evolve:
///
/// - `"TicketPriorityChanged.v1"`
/// - `"TicketStatusChanged.v1"`
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` because the dispatcher hands the
/// same event to several handlers running on different worker threads.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier used for handler routing.
    fn event_type(&self) -> &'static str;

    /// Returns the metadata shared by every domain event.
    fn metadata(&self) -> &EventMetadata;

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not a
    /// valid encoding of this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// Metadata common to every domain event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Identifier the write-side event store assigned to this event.
    pub event_id: EventId,
    /// The aggregate root that changed.
    pub aggregate_id: AggregateId,
    /// When the change happened.
    pub created: DateTime<Utc>,
    /// Who caused the change.
    pub actor_id: UserId,
}

impl EventMetadata {
    /// Create metadata with a freshly generated event id.
    #[must_use]
    pub fn new(aggregate_id: AggregateId, actor_id: UserId, created: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id,
            created,
            actor_id,
        }
    }

    /// Replace the event id (used when rehydrating events from the event store).
    #[must_use]
    pub const fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    /// The read-model ticket this event applies to.
    #[must_use]
    pub fn ticket_id(&self) -> TicketId {
        TicketId::from(&self.aggregate_id)
    }
}

/// A ticket's priority changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPriorityChanged {
    /// Common event metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Priority before the change.
    pub from_priority_id: PriorityId,
    /// Priority after the change.
    pub to_priority_id: PriorityId,
}

impl TicketPriorityChanged {
    /// Event type identifier.
    pub const EVENT_TYPE: &'static str = "TicketPriorityChanged.v1";
}

/// A ticket moved to another status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusChanged {
    /// Common event metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Status before the change.
    pub from_status_id: StatusId,
    /// Status after the change.
    pub to_status_id: StatusId,
}

impl TicketStatusChanged {
    /// Event type identifier.
    pub const EVENT_TYPE: &'static str = "TicketStatusChanged.v1";
}

/// A comment was added to a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCommentAdded {
    /// Common event metadata.
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Comment text.
    pub comment: String,
}

impl TicketCommentAdded {
    /// Event type identifier.
    pub const EVENT_TYPE: &'static str = "TicketCommentAdded.v1";
}

/// All domain events the ticket read side reacts to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data")]
pub enum TicketEvent {
    /// See [`TicketPriorityChanged`].
    PriorityChanged(TicketPriorityChanged),
    /// See [`TicketStatusChanged`].
    StatusChanged(TicketStatusChanged),
    /// See [`TicketCommentAdded`].
    CommentAdded(TicketCommentAdded),
}

impl Event for TicketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::PriorityChanged(_) => TicketPriorityChanged::EVENT_TYPE,
            Self::StatusChanged(_) => TicketStatusChanged::EVENT_TYPE,
            Self::CommentAdded(_) => TicketCommentAdded::EVENT_TYPE,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            Self::PriorityChanged(e) => &e.metadata,
            Self::StatusChanged(e) => &e.metadata,
            Self::CommentAdded(e) => &e.metadata,
        }
    }
}

impl From<TicketPriorityChanged> for TicketEvent {
    fn from(event: TicketPriorityChanged) -> Self {
        Self::PriorityChanged(event)
    }
}

impl From<TicketStatusChanged> for TicketEvent {
    fn from(event: TicketStatusChanged) -> Self {
        Self::StatusChanged(event)
    }
}

impl From<TicketCommentAdded> for TicketEvent {
    fn from(event: TicketCommentAdded) -> Self {
        Self::CommentAdded(event)
    }
}
