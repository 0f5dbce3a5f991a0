//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! These tests use testcontainers to start a broker and validate:
//! - Publish/subscribe round-trip with type headers and ticket keys
//! - Ack commits the offset for the consumer group
//! - Nack forwards to the dead-letter topic
//! - Nack without a dead-letter topic holds the commit position
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they need Docker
//! and take several seconds to start the broker:
//!
//! ```bash
//! cargo test -p ticketflow-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use ticketflow_core::event_bus::{Delivery, EventBus, OutboundMessage, Subscription};
use ticketflow_redpanda::RedpandaEventBus;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(20);

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn bus(brokers: &str, group: &str) -> RedpandaEventBus {
    RedpandaEventBus::builder()
        .brokers(brokers)
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus")
}

fn message(message_type: &str, ticket_id: &str) -> OutboundMessage {
    OutboundMessage {
        message_type: message_type.to_string(),
        version: 1,
        key: Some(ticket_id.to_string()),
        payload: serde_json::to_vec(&serde_json::json!({ "ticketId": ticket_id })).unwrap(),
    }
}

/// Publish until the topic exists and the broker accepts writes.
async fn publish_with_retry(bus: &RedpandaEventBus, topic: &str, message: &OutboundMessage) {
    for _ in 0..60 {
        if bus.publish(topic, message).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("broker never accepted a message on {topic}");
}

async fn next_delivery(subscription: &mut Subscription) -> Option<Delivery> {
    tokio::time::timeout(RECEIVE_TIMEOUT, async {
        loop {
            match subscription.next().await {
                Some(Ok(delivery)) => return Some(delivery),
                Some(Err(_)) => {}
                None => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn published_message_round_trips_with_its_type_header() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "round-trip");

    publish_with_retry(&bus, "ticket-events", &message("TicketPriorityChanged.v1", "T1")).await;

    let mut subscription = bus.subscribe("ticket-events").await.unwrap();
    let delivery = next_delivery(&mut subscription)
        .await
        .expect("message should be delivered");

    assert_eq!(delivery.message().queue, "ticket-events");
    assert_eq!(delivery.message().message_type, "TicketPriorityChanged.v1");
    let payload: serde_json::Value = serde_json::from_slice(&delivery.message().payload).unwrap();
    assert_eq!(payload["ticketId"], "T1");

    delivery.ack().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn acked_message_is_not_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "acks");

    publish_with_retry(&bus, "acked-events", &message("A.v1", "T1")).await;
    bus.publish("acked-events", &message("B.v1", "T2")).await.unwrap();

    let mut subscription = bus.subscribe("acked-events").await.unwrap();
    let first = next_delivery(&mut subscription).await.unwrap();
    assert_eq!(first.message().message_type, "A.v1");
    first.ack().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    drop(subscription);

    // A new member of the same group resumes after the committed offset.
    let mut subscription = bus.subscribe("acked-events").await.unwrap();
    let next = next_delivery(&mut subscription).await.unwrap();
    assert_eq!(next.message().message_type, "B.v1");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn nacked_message_is_forwarded_to_the_dead_letter_topic() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("dead-letters")
        .auto_offset_reset("earliest")
        .dead_letter_topic("ticket-events-dlq")
        .build()
        .unwrap();

    publish_with_retry(&bus, "failing-events", &message("Broken.v1", "T9")).await;

    let mut subscription = bus.subscribe("failing-events").await.unwrap();
    let delivery = next_delivery(&mut subscription).await.unwrap();
    delivery.nack("cannot decode").await.unwrap();

    let mut dead_letters = bus.subscribe("ticket-events-dlq").await.unwrap();
    let forwarded = next_delivery(&mut dead_letters)
        .await
        .expect("nacked message should reach the dead-letter topic");
    assert_eq!(forwarded.message().message_type, "Broken.v1");
    let payload: serde_json::Value = serde_json::from_slice(&forwarded.message().payload).unwrap();
    assert_eq!(payload["ticketId"], "T9");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn refused_message_without_dead_letter_topic_is_redelivered_after_a_later_ack() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "refusals");

    // Same key, same partition.
    publish_with_retry(&bus, "refused-events", &message("Broken.v1", "T1")).await;
    bus.publish("refused-events", &message("Valid.v1", "T1")).await.unwrap();

    let mut subscription = bus.subscribe("refused-events").await.unwrap();
    let refused = next_delivery(&mut subscription).await.unwrap();
    assert_eq!(refused.message().message_type, "Broken.v1");
    refused.nack("cannot decode").await.unwrap();
    let valid = next_delivery(&mut subscription).await.unwrap();
    assert_eq!(valid.message().message_type, "Valid.v1");
    valid.ack().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    drop(subscription);

    // The ack of the later record must not have committed past the refused one.
    let mut subscription = bus.subscribe("refused-events").await.unwrap();
    let redelivered = next_delivery(&mut subscription).await.unwrap();
    assert_eq!(redelivered.message().message_type, "Broken.v1");
}
