//! In-memory message broker.
//!
//! [`InMemoryEventBus`] implements [`EventBus`] for tests of the integration
//! publisher and the listener host:
//!
//! - published messages are recorded per topic
//! - [`InMemoryEventBus::deliver`] pushes an inbound message onto a queue;
//!   messages delivered before anyone subscribed are buffered
//! - every ack/nack is recorded as a [`Settled`] entry
//! - publishing, subscribing and settling can be made to fail

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use crate::CallLog;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketflow_core::event_bus::{
    Acknowledger, BusFuture, Delivery, EventBus, EventBusError, InboundMessage, OutboundMessage,
    Subscription,
};
use tokio::sync::mpsc;

type Feed = Result<Delivery, EventBusError>;

/// How a delivery was settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// Acknowledged.
    Ack,
    /// Refused, with the reason given.
    Nack(String),
}

/// One settled delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settled {
    /// Queue the message arrived on.
    pub queue: String,
    /// Declared message type.
    pub message_type: String,
    /// Ack or nack.
    pub settlement: Settlement,
}

impl Settled {
    /// Whether the delivery was acknowledged.
    #[must_use]
    pub const fn is_ack(&self) -> bool {
        matches!(self.settlement, Settlement::Ack)
    }
}

#[derive(Default)]
struct Queues {
    senders: HashMap<String, mpsc::UnboundedSender<Feed>>,
    pending: HashMap<String, Vec<Feed>>,
}

/// In-memory [`EventBus`].
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
    queues: Arc<Mutex<Queues>>,
    settled: Arc<Mutex<Vec<Settled>>>,
    failing_queues: Arc<Mutex<HashSet<String>>>,
    fail_publishes: Arc<AtomicBool>,
    fail_settlements: Arc<AtomicBool>,
    call_log: Option<CallLog>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record accepted publishes as `"bus.publish"` in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    /// Make subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent acks and nacks fail. Failed settlements are not
    /// recorded.
    pub fn fail_settlements(&self, fail: bool) {
        self.fail_settlements.store(fail, Ordering::SeqCst);
    }

    /// Make subscribing to `queue` fail.
    pub fn fail_subscriptions_to(&self, queue: impl Into<String>) {
        self.failing_queues.lock().unwrap().insert(queue.into());
    }

    /// Every accepted publish as `(topic, message)`.
    #[must_use]
    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.published.lock().unwrap().clone()
    }

    /// Accepted messages of `message_type`, decoded as JSON.
    #[must_use]
    pub fn published_json(&self, message_type: &str) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, message)| message.message_type == message_type)
            .filter_map(|(_, message)| serde_json::from_slice(&message.payload).ok())
            .collect()
    }

    /// Push an inbound message onto `queue`.
    pub fn deliver(&self, queue: &str, message_type: &str, payload: impl Into<Vec<u8>>) {
        let message = InboundMessage::new(queue, message_type, payload);
        let delivery = Delivery::new(
            message,
            Box::new(RecordingAcknowledger {
                queue: queue.to_string(),
                message_type: message_type.to_string(),
                settled: Arc::clone(&self.settled),
                fail: Arc::clone(&self.fail_settlements),
            }),
        );
        self.feed(queue, Ok(delivery));
    }

    /// Push a receive error onto `queue`.
    pub fn deliver_error(&self, queue: &str, error: EventBusError) {
        self.feed(queue, Err(error));
    }

    /// Whether `queue` currently has a live subscription.
    #[must_use]
    pub fn is_subscribed(&self, queue: &str) -> bool {
        self.queues
            .lock()
            .unwrap()
            .senders
            .get(queue)
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Every settled delivery in settlement order.
    #[must_use]
    pub fn settled(&self) -> Vec<Settled> {
        self.settled.lock().unwrap().clone()
    }

    /// Wait until at least `count` deliveries are settled.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_settlements(&self, count: usize, timeout: Duration) -> bool {
        crate::eventually(timeout, || self.settled.lock().unwrap().len() >= count).await
    }

    fn feed(&self, queue: &str, item: Feed) {
        let mut queues = self.queues.lock().unwrap();
        let item = match queues.senders.get(queue) {
            Some(sender) => match sender.send(item) {
                Ok(()) => return,
                Err(mpsc::error::SendError(item)) => item,
            },
            None => item,
        };
        queues.pending.entry(queue.to_string()).or_default().push(item);
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(&'a self, topic: &'a str, message: &'a OutboundMessage) -> BusFuture<'a, ()> {
        Box::pin(async move {
            if let Some(log) = &self.call_log {
                log.record("bus.publish");
            }
            if self.fail_publishes.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "broker unavailable".to_string(),
                });
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), message.clone()));
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, queue: &'a str) -> BusFuture<'a, Subscription> {
        Box::pin(async move {
            if self.failing_queues.lock().unwrap().contains(queue) {
                return Err(EventBusError::SubscriptionFailed {
                    queue: queue.to_string(),
                    reason: "queue does not exist".to_string(),
                });
            }

            let (sender, mut receiver) = mpsc::unbounded_channel();
            {
                let mut queues = self.queues.lock().unwrap();
                for item in queues.pending.remove(queue).unwrap_or_default() {
                    let _ = sender.send(item);
                }
                queues.senders.insert(queue.to_string(), sender);
            }

            let stream = async_stream::stream! {
                while let Some(item) = receiver.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(stream) as Subscription)
        })
    }
}

struct RecordingAcknowledger {
    queue: String,
    message_type: String,
    settled: Arc<Mutex<Vec<Settled>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingAcknowledger {
    fn settle(self, settlement: Settlement) -> Result<(), EventBusError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EventBusError::SettlementFailed(
                "broker rejected the commit".to_string(),
            ));
        }
        self.settled.lock().unwrap().push(Settled {
            queue: self.queue,
            message_type: self.message_type,
            settlement,
        });
        Ok(())
    }
}

impl Acknowledger for RecordingAcknowledger {
    fn ack(self: Box<Self>) -> BusFuture<'static, ()> {
        Box::pin(async move { self.settle(Settlement::Ack) })
    }

    fn nack(self: Box<Self>, reason: String) -> BusFuture<'static, ()> {
        Box::pin(async move { self.settle(Settlement::Nack(reason)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn buffered_messages_reach_a_late_subscriber() {
        let bus = InMemoryEventBus::new();
        bus.deliver("q", "A.v1", b"{}".to_vec());

        let mut subscription = bus.subscribe("q").await.unwrap();
        assert!(bus.is_subscribed("q"));

        let delivery = subscription.next().await.unwrap().unwrap();
        assert_eq!(delivery.message().message_type, "A.v1");
        delivery.nack("bad").await.unwrap();

        assert_eq!(
            bus.settled(),
            vec![Settled {
                queue: "q".to_string(),
                message_type: "A.v1".to_string(),
                settlement: Settlement::Nack("bad".to_string()),
            }]
        );

        drop(subscription);
        assert!(!bus.is_subscribed("q"));
    }

    #[tokio::test]
    async fn publish_records_and_fails_on_demand() {
        let bus = InMemoryEventBus::new();
        let message = OutboundMessage {
            message_type: "M".to_string(),
            version: 1,
            key: Some("T1".to_string()),
            payload: br#"{"ticketId":"T1"}"#.to_vec(),
        };

        bus.publish("topic", &message).await.unwrap();
        bus.fail_publishes(true);
        assert!(bus.publish("topic", &message).await.is_err());

        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.published_json("M")[0]["ticketId"], "T1");
    }

    #[tokio::test]
    async fn failed_settlements_are_errors_and_not_recorded() {
        let bus = InMemoryEventBus::new();
        bus.fail_settlements(true);
        bus.deliver("q", "A.v1", b"{}".to_vec());

        let mut subscription = bus.subscribe("q").await.unwrap();
        let delivery = subscription.next().await.unwrap().unwrap();

        assert!(matches!(
            delivery.ack().await,
            Err(EventBusError::SettlementFailed(_))
        ));
        assert!(bus.settled().is_empty());
    }

    #[tokio::test]
    async fn failing_queue_refuses_subscription() {
        let bus = InMemoryEventBus::new();
        bus.fail_subscriptions_to("broken");
        assert!(matches!(
            bus.subscribe("broken").await,
            Err(EventBusError::SubscriptionFailed { .. })
        ));
    }
}
