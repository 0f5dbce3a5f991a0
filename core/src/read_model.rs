//! Read-model documents maintained by the projections.
//!
//! [`Ticket`] is the denormalized, query-optimized view of a ticket aggregate.
//! [`TicketEventRecord`] is the append-only audit trail entry written once per
//! processed domain event.

use crate::event::EventMetadata;
use crate::types::{AuditId, PriorityId, StatusId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority reference value (e.g. `P2 = "High"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    /// Identifier.
    pub id: PriorityId,
    /// Display name.
    pub name: String,
}

impl Priority {
    /// Create a priority reference value.
    #[must_use]
    pub fn new(id: impl Into<PriorityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Status reference value (e.g. `S1 = "Open"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Identifier.
    pub id: StatusId,
    /// Display name.
    pub name: String,
}

impl Status {
    /// Create a status reference value.
    #[must_use]
    pub fn new(id: impl Into<StatusId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ticket projection, identified by the same id as its aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Identifier (same as the aggregate id).
    pub id: TicketId,
    /// Title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Current priority.
    pub priority: Priority,
    /// Current status.
    pub status: Status,
    /// When the ticket was created.
    pub created: DateTime<Utc>,
}

impl Ticket {
    /// Copy of this ticket with `priority` replaced; every other field is kept.
    #[must_use]
    pub fn with_priority(&self, priority: Priority) -> Self {
        Self {
            priority,
            ..self.clone()
        }
    }

    /// Copy of this ticket with `status` replaced; every other field is kept.
    #[must_use]
    pub fn with_status(&self, status: Status) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// The transition captured by an audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditChange {
    /// Priority moved from one value to another.
    Priority {
        /// Snapshot of the previous priority.
        from: Priority,
        /// Snapshot of the new priority.
        to: Priority,
    },
    /// Status moved from one value to another.
    Status {
        /// Snapshot of the previous status.
        from: Status,
        /// Snapshot of the new status.
        to: Status,
    },
    /// A comment was added.
    Comment {
        /// Comment text.
        text: String,
    },
}

/// Append-only audit record of one ticket transition.
///
/// Never mutated or deleted once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEventRecord {
    /// Unique record id, see [`AuditIdStrategy`].
    pub id: AuditId,
    /// Ticket the transition happened on.
    pub ticket_id: TicketId,
    /// Copied from the triggering event.
    pub created: DateTime<Utc>,
    /// Copied from the triggering event.
    pub user_id: UserId,
    /// What changed.
    pub change: AuditChange,
}

impl TicketEventRecord {
    /// Build the audit record for the event described by `metadata`.
    #[must_use]
    pub fn new(id: AuditId, metadata: &EventMetadata, change: AuditChange) -> Self {
        Self {
            id,
            ticket_id: metadata.ticket_id(),
            created: metadata.created,
            user_id: metadata.actor_id.clone(),
            change,
        }
    }
}

/// Namespace for audit ids derived from event ids.
const AUDIT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2e_8d4a_4f59_a1e7_52c0_9b3d_7e14);

/// How audit record ids are assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditIdStrategy {
    /// Derive the id from the domain event id (UUID v5).
    ///
    /// Redelivery of the same event yields the same id, so an insert-if-absent
    /// audit store keeps exactly one record per event.
    #[default]
    PerEvent,
    /// Random id per handler invocation (UUID v4).
    ///
    /// Every redelivery appends another record.
    PerAttempt,
}

impl AuditIdStrategy {
    /// Assign an audit id for the event described by `metadata`.
    #[must_use]
    pub fn assign(self, metadata: &EventMetadata) -> AuditId {
        match self {
            Self::PerEvent => AuditId::from_uuid(Uuid::new_v5(
                &AUDIT_ID_NAMESPACE,
                metadata.event_id.as_uuid().as_bytes(),
            )),
            Self::PerAttempt => AuditId::from_uuid(Uuid::new_v4()),
        }
    }
}
