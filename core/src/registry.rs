//! Static registry of event decoders.
//!
//! The registry maps a versioned event-type identifier to a decoder producing
//! the application's event type. It is built once at startup and then only
//! read, so the broker listener can turn `(event_type, bytes)` into a typed
//! event without any runtime type discovery.

use crate::event::{
    EventError, TicketCommentAdded, TicketEvent, TicketPriorityChanged, TicketStatusChanged,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;

/// Function turning raw message bytes into an event.
pub type Decoder<E> = fn(&[u8]) -> Result<E, EventError>;

/// Mapping from event-type identifier to decoder.
pub struct EventRegistry<E> {
    decoders: BTreeMap<&'static str, Decoder<E>>,
}

impl<E> EventRegistry<E> {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// Register a decoder for `event_type`, replacing any previous one.
    #[must_use]
    pub fn register(mut self, event_type: &'static str, decoder: Decoder<E>) -> Self {
        self.decoders.insert(event_type, decoder);
        self
    }

    /// Register a JSON payload type that converts into `E`.
    #[must_use]
    pub fn register_json<T>(self, event_type: &'static str) -> Self
    where
        T: DeserializeOwned + Into<E>,
    {
        self.register(event_type, decode_json::<T, E>)
    }

    /// Decode `bytes` as the event registered under `event_type`.
    ///
    /// # Errors
    ///
    /// - [`EventError::UnknownEventType`] if nothing is registered for `event_type`
    /// - [`EventError::DeserializationError`] if the payload does not decode
    pub fn decode(&self, event_type: &str, bytes: &[u8]) -> Result<E, EventError> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| EventError::UnknownEventType(event_type.to_string()))?;
        decoder(bytes)
    }

    /// Whether a decoder exists for `event_type`.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// All registered event types, in sorted order.
    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Number of registered event types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl EventRegistry<TicketEvent> {
    /// Registry of every ticket event this read side understands.
    #[must_use]
    pub fn ticket_events() -> Self {
        Self::new()
            .register_json::<TicketPriorityChanged>(TicketPriorityChanged::EVENT_TYPE)
            .register_json::<TicketStatusChanged>(TicketStatusChanged::EVENT_TYPE)
            .register_json::<TicketCommentAdded>(TicketCommentAdded::EVENT_TYPE)
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn decode_json<T, E>(bytes: &[u8]) -> Result<E, EventError>
where
    T: DeserializeOwned + Into<E>,
{
    serde_json::from_slice::<T>(bytes)
        .map(Into::into)
        .map_err(|e| EventError::DeserializationError(e.to_string()))
}
