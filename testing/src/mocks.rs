//! Fixtures for the reference scenario.
//!
//! Ticket `T1` starts at priority `P1 = "Low"` and status `S1 = "Open"`; user
//! `U1` raises the events. [`Scenario::seeded`] loads all of it into fresh
//! in-memory doubles that share one [`CallLog`].

use crate::{
    CallLog, InMemoryAuditStore, InMemoryEventBus, InMemoryPriorityStore, InMemoryStatusStore,
    InMemoryTicketStore, RecordingRealtime,
};
use chrono::{DateTime, TimeZone, Utc};
use ticketflow_core::EventMetadata;
use ticketflow_core::event::{TicketCommentAdded, TicketPriorityChanged, TicketStatusChanged};
use ticketflow_core::read_model::{Priority, Status, Ticket};
use ticketflow_core::types::{AggregateId, PriorityId, StatusId, UserId};

/// Deterministic timestamp for tests (2025-01-01 00:00:00 UTC).
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// `P1 = "Low"`.
#[must_use]
pub fn priority_low() -> Priority {
    Priority::new("P1", "Low")
}

/// `P2 = "High"`.
#[must_use]
pub fn priority_high() -> Priority {
    Priority::new("P2", "High")
}

/// `S1 = "Open"`.
#[must_use]
pub fn status_open() -> Status {
    Status::new("S1", "Open")
}

/// `S2 = "Closed"`.
#[must_use]
pub fn status_closed() -> Status {
    Status::new("S2", "Closed")
}

/// Ticket `T1` at priority `P1` and status `S1`.
#[must_use]
pub fn ticket_t1() -> Ticket {
    Ticket {
        id: "T1".into(),
        title: "Printer on fire".to_string(),
        description: "Third floor printer emits smoke".to_string(),
        priority: priority_low(),
        status: status_open(),
        created: fixed_time(),
    }
}

/// Metadata of an event on `aggregate` raised by `U1` at `created`.
#[must_use]
pub fn metadata(aggregate: &str, created: DateTime<Utc>) -> EventMetadata {
    EventMetadata::new(AggregateId::new(aggregate), UserId::new("U1"), created)
}

/// `T1` priority change from `from` to `to`.
#[must_use]
pub fn priority_changed(from: &str, to: &str) -> TicketPriorityChanged {
    TicketPriorityChanged {
        metadata: metadata("T1", fixed_time()),
        from_priority_id: PriorityId::new(from),
        to_priority_id: PriorityId::new(to),
    }
}

/// `T1` status change from `from` to `to`.
#[must_use]
pub fn status_changed(from: &str, to: &str) -> TicketStatusChanged {
    TicketStatusChanged {
        metadata: metadata("T1", fixed_time()),
        from_status_id: StatusId::new(from),
        to_status_id: StatusId::new(to),
    }
}

/// Comment added to `T1`.
#[must_use]
pub fn comment_added(text: &str) -> TicketCommentAdded {
    TicketCommentAdded {
        metadata: metadata("T1", fixed_time()),
        comment: text.to_string(),
    }
}

/// Doubles seeded with the reference scenario.
#[derive(Clone)]
pub struct Scenario {
    /// Tickets (`T1`).
    pub tickets: InMemoryTicketStore,
    /// Priorities (`P1`, `P2`).
    pub priorities: InMemoryPriorityStore,
    /// Statuses (`S1`, `S2`).
    pub statuses: InMemoryStatusStore,
    /// Audit records.
    pub audit: InMemoryAuditStore,
    /// Realtime broadcasts.
    pub realtime: RecordingRealtime,
    /// Broker.
    pub bus: InMemoryEventBus,
    /// Order in which side effects completed.
    pub calls: CallLog,
}

impl Scenario {
    /// Fresh doubles holding `T1`, `P1`, `P2`, `S1` and `S2`.
    #[must_use]
    pub fn seeded() -> Self {
        let calls = CallLog::new();
        let scenario = Self {
            tickets: InMemoryTicketStore::new().with_call_log(calls.clone()),
            priorities: InMemoryPriorityStore::new(),
            statuses: InMemoryStatusStore::new(),
            audit: InMemoryAuditStore::new().with_call_log(calls.clone()),
            realtime: RecordingRealtime::new().with_call_log(calls.clone()),
            bus: InMemoryEventBus::new().with_call_log(calls.clone()),
            calls,
        };
        scenario.tickets.insert(ticket_t1());
        scenario.priorities.insert(priority_low());
        scenario.priorities.insert(priority_high());
        scenario.statuses.insert(status_open());
        scenario.statuses.insert(status_closed());
        scenario
    }
}
