//! Error taxonomy of the projection pipeline.
//!
//! Every failure the pipeline reports falls into one of these categories.
//! They decide what happens next: configuration errors stop the process,
//! not-found and persistence errors abort a single handler, fan-out errors are
//! logged without touching committed state, and deserialization errors leave
//! the broker message unacknowledged.

use crate::event::EventError;
use crate::event_bus::EventBusError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Which fan-out sink failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FanoutSink {
    /// Realtime push to connected clients.
    Realtime,
    /// Integration event on the message broker.
    Integration,
}

impl FanoutSink {
    /// Stable lowercase label (used in logs and metrics).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Integration => "integration",
        }
    }
}

impl fmt::Display for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by the projection pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A referenced entity does not exist in the read model.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of entity (`"ticket"`, `"priority"`, ...)
        entity: &'static str,
        /// Identifier that did not resolve
        id: String,
    },

    /// Reading from or writing to a store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A fan-out sink failed after persistence committed.
    #[error("Fan-out to {sink} failed: {reason}")]
    Fanout {
        /// The sink that failed
        sink: FanoutSink,
        /// The reason for failure
        reason: String,
    },

    /// An inbound message could not be turned into an event.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A handler panicked while processing an event.
    #[error("Handler '{handler}' panicked: {reason}")]
    HandlerPanicked {
        /// Name of the handler
        handler: String,
        /// Panic payload, if it was a string
        reason: String,
    },

    /// The message broker could not be reached or refused an operation.
    #[error("Broker error: {0}")]
    Broker(String),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence",
            Self::Fanout { .. } => "fanout",
            Self::Deserialization(_) => "deserialization",
            Self::HandlerPanicked { .. } => "panic",
            Self::Broker(_) => "broker",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<EventBusError> for PipelineError {
    fn from(error: EventBusError) -> Self {
        Self::Broker(error.to_string())
    }
}

impl From<EventError> for PipelineError {
    fn from(error: EventError) -> Self {
        Self::Deserialization(error.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
