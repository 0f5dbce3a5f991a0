//! # Ticketflow Core
//!
//! Core types and adapter traits for the ticket read-side pipeline.
//!
//! The pipeline reacts to domain events raised by the (external) write side:
//! it keeps the denormalized read model current, appends an audit record,
//! pushes a realtime action to connected clients and publishes a durable
//! integration message for other services. This crate holds everything those
//! stages agree on, without any I/O:
//!
//! - [`event`]: domain events and their metadata
//! - [`registry`]: static event-type → decoder mapping
//! - [`read_model`]: ticket projection and audit records
//! - [`store`]: read-model and audit store adapter traits
//! - [`realtime`]: realtime action envelope and transport trait
//! - [`integration`]: versioned integration messages
//! - [`event_bus`]: broker publish/subscribe contract
//! - [`error`]: the pipeline's error taxonomy
//!
//! ## CQRS Separation
//!
//! ```text
//! Write Side (external)              Read Side (this workspace)
//! ┌─────────────────┐   domain     ┌─────────────────────────┐
//! │ Command handler │ ──events──►  │ Dispatcher → Projection │
//! │ Event store     │              │   ├─ read model + audit │
//! └─────────────────┘              │   ├─ realtime push      │
//!                                  │   └─ integration event  │
//!                                  └─────────────────────────┘
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod error;
pub mod event;
pub mod event_bus;
pub mod integration;
pub mod read_model;
pub mod realtime;
pub mod registry;
pub mod store;
pub mod types;

pub use error::{FanoutSink, PipelineError};
pub use event::{Event, EventMetadata, TicketEvent};
pub use registry::EventRegistry;
