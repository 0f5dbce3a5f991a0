//! # Ticketflow Testing
//!
//! In-memory doubles and fixtures for testing the ticketflow pipeline.
//!
//! This crate provides:
//! - [`stores`]: `HashMap`-backed ticket, priority, status and audit stores
//!   with failure injection
//! - [`realtime`]: a realtime transport that records every broadcast
//! - [`event_bus`]: an in-memory broker with per-queue delivery injection and
//!   ack/nack tracking
//! - [`CallLog`]: a shared, ordered log of side-effect calls, for asserting
//!   that persistence happens before fan-out
//! - [`mocks`]: the reference scenario (ticket `T1`, priorities `P1 = "Low"`
//!   and `P2 = "High"`, user `U1`) and a fixed clock
//!
//! ## Example
//!
//! The doubles are cloned into whatever the code under test takes, and the
//! originals are kept for assertions. A projection test in
//! `ticketflow-projections` wires them into a `ProjectionContext`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use ticketflow_core::read_model::AuditIdStrategy;
//! use ticketflow_projections::priority::PriorityChangedHandler;
//! use ticketflow_projections::{IntegrationPublisher, ProjectionContext, RealtimeNotifier};
//! use ticketflow_runtime::FanoutTracker;
//! use ticketflow_testing::mocks::{self, Scenario};
//!
//! #[tokio::test]
//! async fn priority_change_updates_the_ticket() {
//!     let scenario = Scenario::seeded();
//!     let context = ProjectionContext {
//!         tickets: Arc::new(scenario.tickets.clone()),
//!         priorities: Arc::new(scenario.priorities.clone()),
//!         statuses: Arc::new(scenario.statuses.clone()),
//!         audit: Arc::new(scenario.audit.clone()),
//!         notifier: RealtimeNotifier::new(Arc::new(scenario.realtime.clone())),
//!         publisher: IntegrationPublisher::new(
//!             Arc::new(scenario.bus.clone()),
//!             "ticket-integration",
//!         ),
//!         fanout: FanoutTracker::new(),
//!         audit_ids: AuditIdStrategy::PerEvent,
//!     };
//!     let handler = PriorityChangedHandler::new(context);
//!
//!     handler.apply(&mocks::priority_changed("P1", "P2")).await.unwrap();
//!
//!     assert_eq!(scenario.tickets.get("T1").unwrap().priority.name, "High");
//!     assert_eq!(scenario.audit.len(), 1);
//! }
//! ```

use std::sync::{Arc, Mutex};

pub mod event_bus;
pub mod mocks;
pub mod realtime;
pub mod stores;

pub use event_bus::{InMemoryEventBus, Settled, Settlement};
pub use realtime::RecordingRealtime;
pub use stores::{
    InMemoryAuditStore, InMemoryPriorityStore, InMemoryStatusStore, InMemoryTicketStore,
};

/// Ordered log of side-effect calls shared between doubles.
///
/// Each double appends a label (e.g. `"ticket.update"`) once its call has
/// completed, so the log order is the order calls returned.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `label`.
    pub fn record(&self, label: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(label.into());
        }
    }

    /// Snapshot of all labels in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Index of the first occurrence of `label`.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry == label)
    }
}

/// Install a `tracing` subscriber writing to the test output.
///
/// Honors `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns whether it held.
pub async fn eventually(timeout: std::time::Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
