//! Redpanda event bus for Ticketflow.
//!
//! This crate implements the [`EventBus`] trait from `ticketflow-core` on top
//! of rdkafka, so it works with Redpanda or any other Kafka-compatible broker.
//!
//! # Wire Format
//!
//! Every published record carries:
//!
//! - the JSON payload of the integration message as the record value
//! - the partition key of the message (the ticket id) as the record key, so
//!   messages about one ticket keep their order
//! - a `message-type` header and a `message-version` header
//!
//! Inbound records are turned into [`Delivery`] values whose message type is
//! read from the `message-type` header.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset commits:
//!
//! - [`Delivery::ack`] settles the record; the partition is committed up to
//!   the lowest offset that is still in flight or was refused, so records
//!   settled out of order never commit past an unsettled one
//! - [`Delivery::nack`] forwards the record to the dead-letter topic (when one
//!   is configured) and then settles it; without a dead-letter topic the
//!   record holds its partition's commit position, so it (and every later
//!   record of that partition) is redelivered after a restart or rebalance
//! - dropping the [`Subscription`] releases the consumer once every delivery
//!   taken from it has been settled
//!
//! # Example
//!
//! ```no_run
//! use ticketflow_redpanda::RedpandaEventBus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .sasl("ticketflow", "secret")
//!     .consumer_group("ticketflow-projections")
//!     .dead_letter_topic("ticket-events-dlq")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use ticketflow_core::event_bus::{
    Acknowledger, BusFuture, Delivery, EventBus, EventBusError, InboundMessage, OutboundMessage,
    Subscription,
};

mod offsets;

use offsets::OffsetLedger;

/// Header holding the message type.
pub const MESSAGE_TYPE_HEADER: &str = "message-type";

/// Header holding the message schema version.
pub const MESSAGE_VERSION_HEADER: &str = "message-version";

/// Header holding the nack reason on dead-lettered records.
pub const DEAD_LETTER_REASON_HEADER: &str = "dead-letter-reason";

/// Header holding the queue a dead-lettered record was consumed from.
pub const DEAD_LETTER_SOURCE_HEADER: &str = "dead-letter-source";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_AUTO_OFFSET_RESET: &str = "latest";
const DEFAULT_SASL_MECHANISM: &str = "PLAIN";
const DEFAULT_SECURITY_PROTOCOL: &str = "SASL_PLAINTEXT";

/// SASL username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    /// SASL username.
    pub username: String,
    /// SASL password.
    pub password: String,
    /// SASL mechanism (`PLAIN`, `SCRAM-SHA-256`, `SCRAM-SHA-512`).
    pub mechanism: String,
    /// Kafka security protocol (`SASL_PLAINTEXT` or `SASL_SSL`).
    pub security_protocol: String,
}

impl std::fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mechanism", &self.mechanism)
            .field("security_protocol", &self.security_protocol)
            .finish()
    }
}

/// Redpanda event bus.
///
/// One [`FutureProducer`] is shared by every publish; each
/// [`EventBus::subscribe`] call creates its own [`StreamConsumer`] in the
/// configured consumer group.
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    credentials: Option<SaslCredentials>,
    timeout: Duration,
    consumer_group: Option<String>,
    auto_offset_reset: String,
    dead_letter_topic: Option<String>,
}

impl RedpandaEventBus {
    /// Create an event bus for `brokers` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Dead-letter topic for nacked records, if any.
    #[must_use]
    pub fn dead_letter_topic(&self) -> Option<&str> {
        self.dead_letter_topic.as_deref()
    }

    /// Consumer group used for `queue`.
    ///
    /// Defaults to `ticketflow-<queue>` when no group was configured.
    #[must_use]
    pub fn consumer_group_for(&self, queue: &str) -> String {
        self.consumer_group
            .clone()
            .unwrap_or_else(|| format!("ticketflow-{queue}"))
    }

    /// Consumer configuration for `queue`: manual commits, no partition EOF.
    #[must_use]
    pub fn consumer_config(&self, queue: &str) -> ClientConfig {
        let mut config = client_config(&self.brokers, self.credentials.as_ref());
        config
            .set("group.id", self.consumer_group_for(queue))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        config
    }
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("credentials", &self.credentials)
            .field("consumer_group", &self.consumer_group)
            .field("dead_letter_topic", &self.dead_letter_topic)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    credentials: Option<(String, String)>,
    sasl_mechanism: Option<String>,
    security_protocol: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
    dead_letter_topic: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Authenticate with SASL using `username` and `password`.
    #[must_use]
    pub fn sasl(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the SASL mechanism. Default: `PLAIN`.
    #[must_use]
    pub fn sasl_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.sasl_mechanism = Some(mechanism.into());
        self
    }

    /// Set the security protocol used with SASL. Default: `SASL_PLAINTEXT`.
    #[must_use]
    pub fn security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// - `compression`: "none", "gzip", "snappy", "lz4", "zstd"
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group shared by every subscription.
    ///
    /// Instances of the service sharing a group split the partitions of each
    /// queue between them. Without it each queue gets `ticketflow-<queue>`.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set where new consumer groups start reading: `"earliest"`, `"latest"`
    /// or `"error"`.
    ///
    /// Default: "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Forward nacked records to `topic` before committing them.
    #[must_use]
    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers are not set or empty
    /// - SASL username or password is empty
    /// - The producer cannot be created
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|brokers| !brokers.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let credentials = match self.credentials {
            Some((username, password)) => {
                if username.trim().is_empty() {
                    return Err(EventBusError::ConnectionFailed(
                        "SASL username must not be empty".to_string(),
                    ));
                }
                if password.is_empty() {
                    return Err(EventBusError::ConnectionFailed(
                        "SASL password must not be empty".to_string(),
                    ));
                }
                Some(SaslCredentials {
                    username,
                    password,
                    mechanism: self
                        .sasl_mechanism
                        .unwrap_or_else(|| DEFAULT_SASL_MECHANISM.to_string()),
                    security_protocol: self
                        .security_protocol
                        .unwrap_or_else(|| DEFAULT_SECURITY_PROTOCOL.to_string()),
                })
            }
            None => None,
        };

        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut producer_config = client_config(&brokers, credentials.as_ref());
        producer_config
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression);

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string());

        tracing::info!(
            brokers = %brokers,
            sasl = credentials.is_some(),
            acks,
            compression,
            auto_offset_reset = %auto_offset_reset,
            dead_letter_topic = ?self.dead_letter_topic,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            credentials,
            timeout,
            consumer_group: self.consumer_group,
            auto_offset_reset,
            dead_letter_topic: self.dead_letter_topic,
        })
    }
}

fn client_config(brokers: &str, credentials: Option<&SaslCredentials>) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", brokers);
    if let Some(credentials) = credentials {
        config
            .set("security.protocol", &credentials.security_protocol)
            .set("sasl.mechanism", &credentials.mechanism)
            .set("sasl.username", &credentials.username)
            .set("sasl.password", &credentials.password);
    }
    config
}

fn message_headers(message: &OutboundMessage) -> OwnedHeaders {
    let version = message.version.to_string();
    OwnedHeaders::new()
        .insert(Header {
            key: MESSAGE_TYPE_HEADER,
            value: Some(message.message_type.as_str()),
        })
        .insert(Header {
            key: MESSAGE_VERSION_HEADER,
            value: Some(version.as_str()),
        })
}

impl EventBus for RedpandaEventBus {
    fn publish<'a>(&'a self, topic: &'a str, message: &'a OutboundMessage) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic)
                .payload(message.payload.as_slice())
                .headers(message_headers(message));
            if let Some(key) = message.key.as_deref() {
                record = record.key(key);
            }

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic,
                        partition,
                        offset,
                        message_type = %message.message_type,
                        key = ?message.key,
                        "Message published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic,
                        message_type = %message.message_type,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(EventBusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe<'a>(&'a self, queue: &'a str) -> BusFuture<'a, Subscription> {
        Box::pin(async move {
            let consumer: StreamConsumer = self.consumer_config(queue).create().map_err(|e| {
                EventBusError::SubscriptionFailed {
                    queue: queue.to_string(),
                    reason: format!("Failed to create consumer: {e}"),
                }
            })?;

            consumer
                .subscribe(&[queue])
                .map_err(|e| EventBusError::SubscriptionFailed {
                    queue: queue.to_string(),
                    reason: format!("Failed to subscribe: {e}"),
                })?;

            tracing::info!(
                queue,
                consumer_group = %self.consumer_group_for(queue),
                auto_offset_reset = %self.auto_offset_reset,
                dead_letter_topic = ?self.dead_letter_topic,
                "Subscribed to queue"
            );

            let consumer = Arc::new(consumer);
            let ledger = Arc::new(Mutex::new(OffsetLedger::default()));
            let dead_letter = self.dead_letter_topic.clone().map(|topic| DeadLetter {
                producer: self.producer.clone(),
                topic,
                timeout: self.timeout,
            });
            let queue = queue.to_string();

            let stream = async_stream::stream! {
                loop {
                    let item = match consumer.recv().await {
                        Ok(message) => Ok(to_delivery(
                            &queue,
                            &message,
                            &consumer,
                            &ledger,
                            dead_letter.as_ref(),
                        )),
                        Err(e) => Err(EventBusError::TransportError(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };
                    yield item;
                }
            };

            Ok(Box::pin(stream) as Subscription)
        })
    }
}

fn to_delivery(
    queue: &str,
    message: &BorrowedMessage<'_>,
    consumer: &Arc<StreamConsumer>,
    ledger: &Arc<Mutex<OffsetLedger>>,
    dead_letter: Option<&DeadLetter>,
) -> Delivery {
    let message_type = message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == MESSAGE_TYPE_HEADER)
                .and_then(|header| header.value)
                .map(|value| String::from_utf8_lossy(value).into_owned())
        })
        .unwrap_or_default();
    if message_type.is_empty() {
        tracing::warn!(
            queue,
            partition = message.partition(),
            offset = message.offset(),
            "Record has no message-type header"
        );
    }

    let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
    let key = message
        .key()
        .map(|key| String::from_utf8_lossy(key).into_owned());

    tracing::trace!(
        queue,
        partition = message.partition(),
        offset = message.offset(),
        message_type = %message_type,
        "Received record"
    );

    lock_ledger(ledger).track(message.partition(), message.offset());

    let acknowledger = OffsetAcknowledger {
        consumer: Arc::clone(consumer),
        ledger: Arc::clone(ledger),
        queue: queue.to_string(),
        partition: message.partition(),
        offset: message.offset(),
        dead_letter: dead_letter.map(|dead_letter| DeadLetterRecord {
            target: dead_letter.clone(),
            message_type: message_type.clone(),
            key,
            payload: payload.clone(),
        }),
    };

    Delivery::new(
        InboundMessage::new(queue, message_type, payload),
        Box::new(acknowledger),
    )
}

#[derive(Clone)]
struct DeadLetter {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

struct DeadLetterRecord {
    target: DeadLetter,
    message_type: String,
    key: Option<String>,
    payload: Vec<u8>,
}

impl DeadLetterRecord {
    async fn forward(&self, source: &str, reason: &str) -> Result<(), EventBusError> {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: MESSAGE_TYPE_HEADER,
                value: Some(self.message_type.as_str()),
            })
            .insert(Header {
                key: DEAD_LETTER_REASON_HEADER,
                value: Some(reason),
            })
            .insert(Header {
                key: DEAD_LETTER_SOURCE_HEADER,
                value: Some(source),
            });

        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&self.target.topic)
            .payload(self.payload.as_slice())
            .headers(headers);
        if let Some(key) = self.key.as_deref() {
            record = record.key(key);
        }

        self.target
            .producer
            .send(record, Timeout::After(self.target.timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| {
                EventBusError::SettlementFailed(format!(
                    "Failed to forward to dead-letter topic '{}': {e}",
                    self.target.topic
                ))
            })
    }
}

fn lock_ledger(ledger: &Mutex<OffsetLedger>) -> MutexGuard<'_, OffsetLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settles a record through the subscription's [`OffsetLedger`], committing
/// whenever the partition's commit position moves forward.
struct OffsetAcknowledger {
    consumer: Arc<StreamConsumer>,
    ledger: Arc<Mutex<OffsetLedger>>,
    queue: String,
    partition: i32,
    offset: i64,
    dead_letter: Option<DeadLetterRecord>,
}

impl OffsetAcknowledger {
    fn settle(&self) -> Result<(), EventBusError> {
        let position = lock_ledger(&self.ledger).settle(self.partition, self.offset);
        match position {
            Some(position) => self.commit(position),
            None => {
                tracing::trace!(
                    queue = %self.queue,
                    partition = self.partition,
                    offset = self.offset,
                    "Record settled, commit position unchanged"
                );
                Ok(())
            }
        }
    }

    fn commit(&self, position: i64) -> Result<(), EventBusError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.queue, self.partition, Offset::Offset(position))
            .map_err(|e| EventBusError::SettlementFailed(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| {
                EventBusError::SettlementFailed(format!(
                    "Failed to commit offset {position} of {}[{}]: {e}",
                    self.queue, self.partition
                ))
            })
    }
}

impl Acknowledger for OffsetAcknowledger {
    fn ack(self: Box<Self>) -> BusFuture<'static, ()> {
        Box::pin(async move { self.settle() })
    }

    fn nack(self: Box<Self>, reason: String) -> BusFuture<'static, ()> {
        Box::pin(async move {
            let Some(dead_letter) = &self.dead_letter else {
                lock_ledger(&self.ledger).refuse(self.partition, self.offset);
                tracing::warn!(
                    queue = %self.queue,
                    partition = self.partition,
                    offset = self.offset,
                    reason = %reason,
                    "Record refused, holding the partition's commit position"
                );
                return Ok(());
            };

            dead_letter.forward(&self.queue, &reason).await?;
            tracing::warn!(
                queue = %self.queue,
                partition = self.partition,
                offset = self.offset,
                dead_letter_topic = %dead_letter.target.topic,
                reason = %reason,
                "Record refused, forwarded to dead-letter topic"
            );
            self.settle()
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_requires_brokers() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));

        let result = RedpandaEventBus::builder().brokers("  ").build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn build_rejects_empty_credentials() {
        let result = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .sasl("", "secret")
            .build();
        assert!(matches!(
            result,
            Err(EventBusError::ConnectionFailed(reason)) if reason.contains("username")
        ));

        let result = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .sasl("ticketflow", "")
            .build();
        assert!(matches!(
            result,
            Err(EventBusError::ConnectionFailed(reason)) if reason.contains("password")
        ));
    }

    #[test]
    fn client_config_carries_sasl_settings() {
        let credentials = SaslCredentials {
            username: "ticketflow".to_string(),
            password: "secret".to_string(),
            mechanism: "SCRAM-SHA-256".to_string(),
            security_protocol: "SASL_SSL".to_string(),
        };

        let config = client_config("broker:9092", Some(&credentials));
        assert_eq!(config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(config.get("sasl.username"), Some("ticketflow"));
        assert_eq!(config.get("sasl.password"), Some("secret"));
        assert_eq!(config.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
        assert_eq!(config.get("security.protocol"), Some("SASL_SSL"));

        let config = client_config("broker:9092", None);
        assert_eq!(config.get("sasl.username"), None);
    }

    #[test]
    fn credentials_debug_hides_the_password() {
        let credentials = SaslCredentials {
            username: "ticketflow".to_string(),
            password: "hunter2".to_string(),
            mechanism: DEFAULT_SASL_MECHANISM.to_string(),
            security_protocol: DEFAULT_SECURITY_PROTOCOL.to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("ticketflow"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn consumer_config_uses_manual_commits() {
        let bus = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .sasl("ticketflow", "secret")
            .auto_offset_reset("earliest")
            .build()
            .expect("producer creation does not connect");

        let config = bus.consumer_config("ticket-events");
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("group.id"), Some("ticketflow-ticket-events"));
        assert_eq!(config.get("sasl.username"), Some("ticketflow"));
        assert_eq!(bus.dead_letter_topic(), None);
    }

    #[test]
    fn explicit_consumer_group_is_shared_by_every_queue() {
        let bus = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .consumer_group("ticketflow-projections")
            .dead_letter_topic("ticket-events-dlq")
            .build()
            .unwrap();

        assert_eq!(bus.consumer_group_for("a"), "ticketflow-projections");
        assert_eq!(bus.consumer_group_for("b"), "ticketflow-projections");
        assert_eq!(bus.dead_letter_topic(), Some("ticket-events-dlq"));
    }

    #[test]
    fn published_headers_carry_type_and_version() {
        let message = OutboundMessage {
            message_type: "TicketPriorityIntegrationEvent".to_string(),
            version: 1,
            key: Some("T1".to_string()),
            payload: b"{}".to_vec(),
        };

        let headers = message_headers(&message);
        let pairs: Vec<(String, Vec<u8>)> = headers
            .iter()
            .map(|header| (header.key.to_string(), header.value.unwrap_or_default().to_vec()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                (
                    MESSAGE_TYPE_HEADER.to_string(),
                    b"TicketPriorityIntegrationEvent".to_vec()
                ),
                (MESSAGE_VERSION_HEADER.to_string(), b"1".to_vec()),
            ]
        );
    }
}
