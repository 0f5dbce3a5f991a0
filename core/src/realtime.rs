//! Realtime actions pushed to live UI subscribers.
//!
//! A [`RealtimeAction`] is the `{ type, payload }` envelope the front end
//! reduces into its view state. Actions are ephemeral: clients that are not
//! connected when an action is broadcast never see it.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Action type constants understood by the front end.
pub mod action_types {
    /// A ticket's priority changed.
    pub const ADD_TICKET_PRIORITY_UPDATE: &str = "ADD_TICKET_PRIORITY_UPDATE";
    /// A ticket's status changed.
    pub const ADD_TICKET_STATUS_UPDATE: &str = "ADD_TICKET_STATUS_UPDATE";
    /// A comment was added to a ticket.
    pub const ADD_TICKET_COMMENT: &str = "ADD_TICKET_COMMENT";
}

/// Tagged action envelope: `{ "type": "...", "payload": {...} }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeAction<T> {
    /// One of the [`action_types`] constants.
    #[serde(rename = "type")]
    pub action_type: String,
    /// View-shaped payload.
    pub payload: T,
}

impl<T> RealtimeAction<T> {
    /// Create an action.
    #[must_use]
    pub fn new(action_type: impl Into<String>, payload: T) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }
}

/// Errors raised by a realtime transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    /// The action could not be encoded.
    #[error("Failed to encode realtime action: {0}")]
    Encoding(String),

    /// The transport is not accepting broadcasts (e.g. shut down).
    #[error("Realtime transport unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients that received the action.
    pub delivered: usize,
    /// Clients dropped because they were too slow or disconnected.
    pub dropped: usize,
}

/// Boxed future returned by realtime transports.
pub type RealtimeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BroadcastReport, RealtimeError>> + Send + 'a>>;

/// Transport delivering actions to every connected client.
///
/// Implementations must bound the time spent on any single client and drop
/// clients that exceed it instead of blocking the caller.
pub trait RealtimeTransport: Send + Sync {
    /// Deliver `payload` tagged with `action_type` to all connected clients.
    ///
    /// # Errors
    ///
    /// Returns a [`RealtimeError`] if the action cannot be broadcast at all.
    /// Individual slow clients are not errors; they show up in
    /// [`BroadcastReport::dropped`].
    fn broadcast<'a>(
        &'a self,
        action_type: &'a str,
        payload: serde_json::Value,
    ) -> RealtimeFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)]
    fn action_serializes_with_type_tag() {
        let action = RealtimeAction::new(
            action_types::ADD_TICKET_COMMENT,
            serde_json::json!({ "ticketId": "T1" }),
        );

        let value = serde_json::to_value(&action).expect("serialization should succeed");

        assert_eq!(value["type"], "ADD_TICKET_COMMENT");
        assert_eq!(value["payload"]["ticketId"], "T1");
    }
}
