//! Adapter traits for the read-model and audit stores.
//!
//! Projections only ever talk to persistence through these traits. The
//! traits return boxed futures instead of using `async fn` so they stay
//! dyn-compatible: handlers hold `Arc<dyn TicketStore>` and friends, which lets
//! the same handler run against Postgres in production and in-memory doubles
//! in tests.
//!
//! Implementations must be safe to share between concurrently running
//! handlers (pooled connections, no handler-level locking). Concurrent
//! updates of the same ticket resolve last-write-wins.

use crate::read_model::{Priority, Status, Ticket, TicketEventRecord};
use crate::types::{PriorityId, StatusId, TicketId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by store adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of document
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The backing store failed (connection, query, constraint).
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A stored document could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Read-model store for tickets.
pub trait TicketStore: Send + Sync {
    /// Load a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such ticket exists, or another
    /// [`StoreError`] if the store fails.
    fn find<'a>(&'a self, id: &'a TicketId) -> StoreFuture<'a, Ticket>;

    /// Replace the stored ticket with `ticket`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn update<'a>(&'a self, ticket: &'a Ticket) -> StoreFuture<'a, ()>;
}

/// Read-model store for priority reference values.
pub trait PriorityStore: Send + Sync {
    /// Load a priority by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such priority exists.
    fn find<'a>(&'a self, id: &'a PriorityId) -> StoreFuture<'a, Priority>;
}

/// Read-model store for status reference values.
pub trait StatusStore: Send + Sync {
    /// Load a status by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such status exists.
    fn find<'a>(&'a self, id: &'a StatusId) -> StoreFuture<'a, Status>;
}

/// Append-only store for audit records.
pub trait AuditStore: Send + Sync {
    /// Append `record`.
    ///
    /// Adding a record whose id is already stored is a no-op, which makes
    /// redelivery safe when ids are derived from the event id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn add<'a>(&'a self, record: &'a TicketEventRecord) -> StoreFuture<'a, ()>;
}
