//! Listener host lifecycle and message settlement against the in-memory broker.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use ticketflow_core::event::{TicketCommentAdded, TicketPriorityChanged};
use ticketflow_core::event_bus::EventBusError;
use ticketflow_core::{EventRegistry, PipelineError, TicketEvent};
use ticketflow_runtime::{
    Dispatcher, EventHandler, HandlerFuture, HostState, ListenerConfig, ListenerHost, QueueBinding,
};
use ticketflow_testing::mocks;
use ticketflow_testing::{InMemoryEventBus, Settlement};

const QUEUE: &str = "ticket-events";
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts events; fails comments whose text is `"fail"`; optionally slow.
#[derive(Default)]
struct CountingHandler {
    handled: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingHandler {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

impl EventHandler<TicketEvent> for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    fn handle<'a>(&'a self, event: &'a TicketEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.handled.fetch_add(1, Ordering::SeqCst);

            match event {
                TicketEvent::CommentAdded(comment) if comment.comment == "fail" => {
                    Err(PipelineError::Persistence("rejected".to_string()))
                }
                _ => Ok(()),
            }
        })
    }
}

fn host(
    bus: &InMemoryEventBus,
    handler: &Arc<CountingHandler>,
    bindings: Vec<QueueBinding>,
) -> ListenerHost<TicketEvent> {
    let dispatcher = Dispatcher::builder()
        .route(TicketPriorityChanged::EVENT_TYPE, handler.clone())
        .route(TicketCommentAdded::EVENT_TYPE, handler.clone())
        .build();
    ListenerHost::new(
        ListenerConfig::new(bindings).with_shutdown_timeout(Duration::from_secs(5)),
        Arc::new(bus.clone()),
        Arc::new(EventRegistry::ticket_events()),
        Arc::new(dispatcher),
    )
    .expect("valid configuration")
}

fn priority_binding() -> QueueBinding {
    QueueBinding::new(QUEUE, [TicketPriorityChanged::EVENT_TYPE, TicketCommentAdded::EVENT_TYPE])
}

fn priority_payload() -> Vec<u8> {
    serde_json::to_vec(&mocks::priority_changed("P1", "P2")).unwrap()
}

fn comment_payload(text: &str) -> Vec<u8> {
    serde_json::to_vec(&mocks::comment_added(text)).unwrap()
}

#[tokio::test]
async fn lifecycle_moves_through_every_state() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(&bus, &handler, vec![priority_binding()]);
    let mut states = host.watch_state();

    assert_eq!(host.state(), HostState::Created);
    host.start().await.unwrap();
    assert_eq!(host.state(), HostState::Running);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), HostState::Running);
    assert!(bus.is_subscribed(QUEUE));

    let stats = host.stop().await.unwrap();
    assert_eq!(host.state(), HostState::Stopped);
    assert_eq!(stats.len(), 1);
    assert!(!bus.is_subscribed(QUEUE));
}

#[tokio::test]
async fn misuse_of_the_lifecycle_is_an_invalid_state_error() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(&bus, &handler, vec![priority_binding()]);

    assert!(matches!(host.stop().await, Err(PipelineError::InvalidState(_))));

    host.start().await.unwrap();
    assert!(matches!(host.start().await, Err(PipelineError::InvalidState(_))));

    host.stop().await.unwrap();
    assert!(matches!(host.stop().await, Err(PipelineError::InvalidState(_))));
    assert!(matches!(host.start().await, Err(PipelineError::InvalidState(_))));
}

#[tokio::test]
async fn failed_subscription_releases_started_endpoints() {
    let bus = InMemoryEventBus::new();
    bus.fail_subscriptions_to("broken");
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(
        &bus,
        &handler,
        vec![
            priority_binding(),
            QueueBinding::new("broken", [TicketCommentAdded::EVENT_TYPE]),
        ],
    );

    let result = host.start().await;

    assert!(matches!(result, Err(PipelineError::Broker(_))));
    assert_eq!(host.state(), HostState::Stopped);
    assert!(!bus.is_subscribed(QUEUE));
}

#[tokio::test]
async fn malformed_message_is_nacked_and_later_messages_are_processed() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(&bus, &handler, vec![priority_binding()]);
    host.start().await.unwrap();

    bus.deliver(QUEUE, TicketPriorityChanged::EVENT_TYPE, b"{\"garbage\":true}".to_vec());
    bus.deliver_error(QUEUE, EventBusError::ConnectionFailed("blip".to_string()));
    bus.deliver(QUEUE, TicketPriorityChanged::EVENT_TYPE, priority_payload());

    assert!(bus.wait_for_settlements(2, SETTLE_TIMEOUT).await);
    let stats = host.stop().await.unwrap();

    let settled = bus.settled();
    assert!(matches!(settled[0].settlement, Settlement::Nack(_)));
    assert!(settled[1].is_ack());
    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    assert_eq!(stats[0].received, 2);
    assert_eq!(stats[0].acked, 1);
    assert_eq!(stats[0].nacked, 1);
}

#[tokio::test]
async fn undeclared_event_type_is_nacked_without_dispatch() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(
        &bus,
        &handler,
        vec![QueueBinding::new(QUEUE, [TicketPriorityChanged::EVENT_TYPE])],
    );
    host.start().await.unwrap();

    bus.deliver(QUEUE, TicketCommentAdded::EVENT_TYPE, comment_payload("hi"));

    assert!(bus.wait_for_settlements(1, SETTLE_TIMEOUT).await);
    host.stop().await.unwrap();

    match &bus.settled()[0].settlement {
        Settlement::Nack(reason) => assert!(reason.contains("not bound"), "{reason}"),
        Settlement::Ack => panic!("undeclared type must not be acknowledged"),
    }
    assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn handler_failure_is_nacked() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(&bus, &handler, vec![priority_binding()]);
    host.start().await.unwrap();

    bus.deliver(QUEUE, TicketCommentAdded::EVENT_TYPE, comment_payload("fail"));
    bus.deliver(QUEUE, TicketCommentAdded::EVENT_TYPE, comment_payload("fine"));

    assert!(bus.wait_for_settlements(2, SETTLE_TIMEOUT).await);
    host.stop().await.unwrap();

    let settled = bus.settled();
    match &settled[0].settlement {
        Settlement::Nack(reason) => assert!(reason.contains("counting"), "{reason}"),
        Settlement::Ack => panic!("failed message must not be acknowledged"),
    }
    assert!(settled[1].is_ack());
}

#[tokio::test]
async fn failed_ack_is_counted_as_unsettled() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::default());
    let mut host = host(&bus, &handler, vec![priority_binding()]);
    host.start().await.unwrap();

    bus.fail_settlements(true);
    bus.deliver(QUEUE, TicketPriorityChanged::EVENT_TYPE, priority_payload());
    let handled = ticketflow_testing::eventually(SETTLE_TIMEOUT, || {
        handler.handled.load(Ordering::SeqCst) == 1
    })
    .await;
    assert!(handled);

    let stats = host.stop().await.unwrap();

    assert!(bus.settled().is_empty());
    assert_eq!(stats[0].received, 1);
    assert_eq!(stats[0].acked, 0);
    assert_eq!(stats[0].unsettled, 1);
}

#[tokio::test]
async fn stop_waits_for_in_flight_messages() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::slow(Duration::from_millis(200)));
    let mut host = host(&bus, &handler, vec![priority_binding()]);
    host.start().await.unwrap();

    bus.deliver(QUEUE, TicketPriorityChanged::EVENT_TYPE, priority_payload());
    let started = ticketflow_testing::eventually(SETTLE_TIMEOUT, || {
        handler.running.load(Ordering::SeqCst) == 1
    })
    .await;
    assert!(started);

    host.stop().await.unwrap();

    assert_eq!(host.state(), HostState::Stopped);
    let settled = bus.settled();
    assert_eq!(settled.len(), 1);
    assert!(settled[0].is_ack());
}

#[tokio::test]
async fn endpoint_concurrency_is_bounded_by_max_in_flight() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::slow(Duration::from_millis(50)));
    let mut host = host(&bus, &handler, vec![priority_binding().with_max_in_flight(3)]);
    host.start().await.unwrap();

    for _ in 0..9 {
        bus.deliver(QUEUE, TicketPriorityChanged::EVENT_TYPE, priority_payload());
    }

    assert!(bus.wait_for_settlements(9, SETTLE_TIMEOUT).await);
    host.stop().await.unwrap();

    let max_running = handler.max_running.load(Ordering::SeqCst);
    assert!(max_running <= 3, "ran {max_running} concurrently");
    assert!(max_running >= 2, "messages were not processed concurrently");
}

#[tokio::test]
async fn default_endpoint_processes_one_message_at_a_time() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(CountingHandler::slow(Duration::from_millis(20)));
    let mut host = host(&bus, &handler, vec![priority_binding()]);
    host.start().await.unwrap();

    for _ in 0..4 {
        bus.deliver(QUEUE, TicketPriorityChanged::EVENT_TYPE, priority_payload());
    }

    assert!(bus.wait_for_settlements(4, SETTLE_TIMEOUT).await);
    host.stop().await.unwrap();

    assert_eq!(handler.max_running.load(Ordering::SeqCst), 1);
}
