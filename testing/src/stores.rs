//! In-memory read-model and audit stores.
//!
//! Fast, deterministic stand-ins for the Postgres adapters:
//! - [`InMemoryTicketStore`]: tickets keyed by id, with failure injection
//!   and an optional write delay
//! - [`InMemoryPriorityStore`] / [`InMemoryStatusStore`]: reference values
//! - [`InMemoryAuditStore`]: insert-if-absent audit records
//!
//! Every store is `Clone`; clones share the same data, so a test keeps one
//! handle for assertions and gives another to the code under test.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use crate::CallLog;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use ticketflow_core::read_model::{Priority, Status, Ticket, TicketEventRecord};
use ticketflow_core::store::{
    AuditStore, PriorityStore, StatusStore, StoreError, StoreFuture, TicketStore,
};
use ticketflow_core::types::{AuditId, PriorityId, StatusId, TicketId};

/// In-memory ticket store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: Arc<RwLock<HashMap<TicketId, Ticket>>>,
    fail_finds: Arc<AtomicBool>,
    fail_updates: Arc<AtomicBool>,
    updates: Arc<AtomicUsize>,
    update_delay: Option<Duration>,
    call_log: Option<CallLog>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record completed updates as `"ticket.update"` in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    /// Make every update take at least `delay`.
    #[must_use]
    pub const fn with_update_delay(mut self, delay: Duration) -> Self {
        self.update_delay = Some(delay);
        self
    }

    /// Insert or replace a ticket directly.
    pub fn insert(&self, ticket: Ticket) {
        self.tickets.write().unwrap().insert(ticket.id.clone(), ticket);
    }

    /// Current value of a ticket.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Ticket> {
        self.tickets.read().unwrap().get(&TicketId::new(id)).cloned()
    }

    /// Number of successful updates.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make subsequent finds fail with a backend error.
    pub fn fail_finds(&self, fail: bool) {
        self.fail_finds.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent updates fail with a backend error.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl TicketStore for InMemoryTicketStore {
    fn find<'a>(&'a self, id: &'a TicketId) -> StoreFuture<'a, Ticket> {
        Box::pin(async move {
            if self.fail_finds.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("ticket store unavailable".to_string()));
            }
            self.tickets
                .read()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    entity: "ticket",
                    id: id.to_string(),
                })
        })
    }

    fn update<'a>(&'a self, ticket: &'a Ticket) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if let Some(delay) = self.update_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("ticket write rejected".to_string()));
            }
            self.tickets
                .write()
                .unwrap()
                .insert(ticket.id.clone(), ticket.clone());
            self.updates.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.call_log {
                log.record("ticket.update");
            }
            Ok(())
        })
    }
}

/// In-memory priority reference values.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPriorityStore {
    priorities: Arc<RwLock<HashMap<PriorityId, Priority>>>,
}

impl InMemoryPriorityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a priority.
    pub fn insert(&self, priority: Priority) {
        self.priorities
            .write()
            .unwrap()
            .insert(priority.id.clone(), priority);
    }

    /// Remove a priority.
    pub fn remove(&self, id: &str) {
        self.priorities.write().unwrap().remove(&PriorityId::new(id));
    }
}

impl PriorityStore for InMemoryPriorityStore {
    fn find<'a>(&'a self, id: &'a PriorityId) -> StoreFuture<'a, Priority> {
        Box::pin(async move {
            self.priorities
                .read()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    entity: "priority",
                    id: id.to_string(),
                })
        })
    }
}

/// In-memory status reference values.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStatusStore {
    statuses: Arc<RwLock<HashMap<StatusId, Status>>>,
}

impl InMemoryStatusStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a status.
    pub fn insert(&self, status: Status) {
        self.statuses
            .write()
            .unwrap()
            .insert(status.id.clone(), status);
    }
}

impl StatusStore for InMemoryStatusStore {
    fn find<'a>(&'a self, id: &'a StatusId) -> StoreFuture<'a, Status> {
        Box::pin(async move {
            self.statuses
                .read()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    entity: "status",
                    id: id.to_string(),
                })
        })
    }
}

/// In-memory append-only audit store.
///
/// Adding a record whose id is already stored is a no-op.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<Vec<TicketEventRecord>>>,
    fail_adds: Arc<AtomicBool>,
    call_log: Option<CallLog>,
}

impl InMemoryAuditStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record completed adds as `"audit.add"` in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    /// All stored records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<TicketEventRecord> {
        self.records.read().unwrap().clone()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Whether no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Whether a record with `id` is stored.
    #[must_use]
    pub fn contains(&self, id: AuditId) -> bool {
        self.records.read().unwrap().iter().any(|r| r.id == id)
    }

    /// Make subsequent adds fail with a backend error.
    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }
}

impl AuditStore for InMemoryAuditStore {
    fn add<'a>(&'a self, record: &'a TicketEventRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_adds.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("audit write rejected".to_string()));
            }
            {
                let mut records = self.records.write().unwrap();
                if !records.iter().any(|r| r.id == record.id) {
                    records.push(record.clone());
                }
            }
            if let Some(log) = &self.call_log {
                log.record("audit.add");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, fixed_time};
    use ticketflow_core::read_model::{AuditChange, AuditIdStrategy};

    #[test]
    fn missing_ticket_is_not_found() {
        let store = InMemoryTicketStore::new();
        let result = tokio_test::block_on(store.find(&TicketId::new("T9")));
        assert_eq!(
            result,
            Err(StoreError::NotFound {
                entity: "ticket",
                id: "T9".to_string()
            })
        );
    }

    #[test]
    fn update_replaces_the_ticket_and_logs() {
        let log = CallLog::new();
        let store = InMemoryTicketStore::new().with_call_log(log.clone());
        let ticket = mocks::ticket_t1();
        store.insert(ticket.clone());

        let updated = ticket.with_priority(mocks::priority_high());
        tokio_test::block_on(store.update(&updated)).unwrap();

        assert_eq!(store.get("T1"), Some(updated));
        assert_eq!(store.update_count(), 1);
        assert_eq!(log.entries(), vec!["ticket.update"]);
    }

    #[test]
    fn audit_store_inserts_if_absent() {
        let store = InMemoryAuditStore::new();
        let metadata = mocks::metadata("T1", fixed_time());
        let record = TicketEventRecord::new(
            AuditIdStrategy::PerEvent.assign(&metadata),
            &metadata,
            AuditChange::Comment {
                text: "hi".to_string(),
            },
        );

        tokio_test::block_on(store.add(&record)).unwrap();
        tokio_test::block_on(store.add(&record)).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains(record.id));
    }

    #[test]
    fn injected_failures_surface_as_backend_errors() {
        let tickets = InMemoryTicketStore::new();
        tickets.insert(mocks::ticket_t1());
        tickets.fail_updates(true);
        let result = tokio_test::block_on(tickets.update(&mocks::ticket_t1()));
        assert!(matches!(result, Err(StoreError::Backend(_))));

        let audit = InMemoryAuditStore::new();
        audit.fail_adds(true);
        let metadata = mocks::metadata("T1", fixed_time());
        let record = TicketEventRecord::new(
            AuditIdStrategy::PerAttempt.assign(&metadata),
            &metadata,
            AuditChange::Comment {
                text: "hi".to_string(),
            },
        );
        assert!(tokio_test::block_on(audit.add(&record)).is_err());
        assert!(audit.is_empty());
    }
}
