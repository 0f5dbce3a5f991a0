//! Event bus abstraction for integration messaging with other services.
//!
//! The [`EventBus`] trait is the seam between the pipeline and the external
//! message broker. It has two directions:
//!
//! - **Outbound**: the integration publisher hands versioned integration
//!   messages to [`EventBus::publish`]. The call resolves once the broker has
//!   accepted the message, not once consumers received it.
//! - **Inbound**: the broker listener host calls [`EventBus::subscribe`] once
//!   per configured queue and receives a [`Subscription`] of [`Delivery`]
//!   values. Every delivery must be settled with [`Delivery::ack`] or
//!   [`Delivery::nack`].
//!
//! # Delivery Semantics
//!
//! - **At-least-once**: a message that is nacked, or never settled because the
//!   process died, is redelivered or dead-lettered according to the broker's
//!   own policy. The listener host never retries by itself.
//! - **Scoped subscriptions**: dropping a [`Subscription`] releases it.
//!
//! # Architecture
//!
//! ```text
//!  Projection handler            Listener host
//!          │                          ▲
//!          │ publish                  │ Subscription<Delivery>
//!          ▼                          │
//! ┌──────────────────────────────────────────┐
//! │          EventBus (Redpanda)             │
//! └──────────────────────────────────────────┘
//! ```

use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a queue
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed to subscribe
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to settle (ack or nack) a delivery
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Boxed future returned by event bus operations.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventBusError>> + Send + 'a>>;

/// A message handed to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message type identifier (e.g. `"TicketPriorityIntegrationEvent"`).
    pub message_type: String,
    /// Schema version of `payload`.
    pub version: u32,
    /// Partitioning key; messages with the same key keep their order.
    pub key: Option<String>,
    /// Encoded message body.
    pub payload: Vec<u8>,
}

/// A message received from a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Queue the message arrived on.
    pub queue: String,
    /// Declared message type (the event-type identifier for domain events).
    pub message_type: String,
    /// Encoded message body.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create an inbound message.
    #[must_use]
    pub fn new(
        queue: impl Into<String>,
        message_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            queue: queue.into(),
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InboundMessage {{ queue: {}, type: {}, size: {} bytes }}",
            self.queue,
            self.message_type,
            self.payload.len()
        )
    }
}

/// Broker-specific settlement of one delivery.
pub trait Acknowledger: Send {
    /// Confirm the message was processed; the broker may forget it.
    fn ack(self: Box<Self>) -> BusFuture<'static, ()>;

    /// Refuse the message; the broker redelivers or dead-letters it.
    fn nack(self: Box<Self>, reason: String) -> BusFuture<'static, ()>;
}

/// A received message that must be settled exactly once.
pub struct Delivery {
    message: InboundMessage,
    acknowledger: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Pair a message with the broker's settlement handle.
    #[must_use]
    pub fn new(message: InboundMessage, acknowledger: Box<dyn Acknowledger>) -> Self {
        Self {
            message,
            acknowledger,
        }
    }

    /// The received message.
    #[must_use]
    pub const fn message(&self) -> &InboundMessage {
        &self.message
    }

    /// Acknowledge the message.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SettlementFailed`] if the broker rejects the ack.
    pub async fn ack(self) -> Result<(), EventBusError> {
        self.acknowledger.ack().await
    }

    /// Refuse the message, leaving redelivery to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SettlementFailed`] if the broker rejects the nack.
    pub async fn nack(self, reason: impl Into<String>) -> Result<(), EventBusError> {
        self.acknowledger.nack(reason.into()).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from one queue. Dropping it releases the subscription.
pub type Subscription = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the same bus is shared by every
/// projection handler (publishing) and every receive endpoint (subscribing).
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be used as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker did not accept
    /// the message.
    fn publish<'a>(&'a self, topic: &'a str, message: &'a OutboundMessage) -> BusFuture<'a, ()>;

    /// Open a subscription on `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription
    /// cannot be established.
    fn subscribe<'a>(&'a self, queue: &'a str) -> BusFuture<'a, Subscription>;
}
