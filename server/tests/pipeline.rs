//! The assembled service running against in-memory doubles.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use ticketflow_core::PipelineError;
use ticketflow_core::event::{TicketCommentAdded, TicketPriorityChanged};
use ticketflow_core::realtime::{RealtimeError, RealtimeTransport};
use ticketflow_server::{Application, Config, Stores, assemble};
use ticketflow_testing::mocks::{self, Scenario};
use ticketflow_web::WebSocketHub;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const QUEUE: &str = "ticket-events";
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

fn config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("BROKER_USERNAME", "ticketflow"),
        ("BROKER_PASSWORD", "secret"),
        ("SHUTDOWN_TIMEOUT", "5"),
        ("LISTENER_SHUTDOWN_TIMEOUT", "5"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();
    vars.extend(extra.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));

    let config = Config::from_lookup(move |key: &str| vars.get(key).cloned()).unwrap();
    config.validate().unwrap();
    config
}

fn stores(scenario: &Scenario) -> Stores {
    Stores {
        tickets: Arc::new(scenario.tickets.clone()),
        priorities: Arc::new(scenario.priorities.clone()),
        statuses: Arc::new(scenario.statuses.clone()),
        audit: Arc::new(scenario.audit.clone()),
    }
}

#[test]
fn bindings_to_unknown_event_types_are_rejected_at_assembly() {
    let scenario = Scenario::seeded();
    let config = config(&[("LISTENER_BINDINGS", "ticket-events=TicketArchived.v1")]);

    let result = assemble(
        &config,
        stores(&scenario),
        Arc::new(scenario.bus.clone()),
        Arc::new(scenario.realtime.clone()),
    );

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[tokio::test]
async fn assembled_pipeline_projects_and_publishes_to_the_integration_topic() {
    let scenario = Scenario::seeded();
    let config = config(&[("INTEGRATION_TOPIC", "ticket-integration")]);
    let mut pipeline = assemble(
        &config,
        stores(&scenario),
        Arc::new(scenario.bus.clone()),
        Arc::new(scenario.realtime.clone()),
    )
    .unwrap();

    pipeline.listener.start().await.unwrap();
    scenario.bus.deliver(
        QUEUE,
        TicketPriorityChanged::EVENT_TYPE,
        serde_json::to_vec(&mocks::priority_changed("P1", "P2")).unwrap(),
    );
    assert!(scenario.bus.wait_for_settlements(1, SETTLE_TIMEOUT).await);
    pipeline.listener.stop().await.unwrap();
    assert!(pipeline.fanout().drain_with_timeout(SETTLE_TIMEOUT).await);

    assert!(scenario.bus.settled()[0].is_ack());
    assert_eq!(
        scenario.tickets.get("T1").unwrap().priority,
        mocks::priority_high()
    );
    assert_eq!(scenario.audit.len(), 1);
    assert_eq!(scenario.realtime.broadcasts().len(), 1);

    let published = scenario.bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "ticket-integration");
}

#[tokio::test]
async fn application_runs_until_shutdown_then_stops_in_order() {
    let scenario = Scenario::seeded();
    let config = config(&[]);
    let hub = WebSocketHub::with_limits(config.realtime_client_timeout(), 8);
    let pipeline = assemble(
        &config,
        stores(&scenario),
        Arc::new(scenario.bus.clone()),
        Arc::new(hub.clone()),
    )
    .unwrap();

    let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let app = Application::new(
        http,
        ticketflow_web::router(hub.clone()),
        pipeline,
        hub.clone(),
        config.shutdown_timeout(),
    );
    let (shutdown, shutdown_requested) = oneshot::channel::<()>();
    let running = tokio::spawn(app.run(async move {
        let _ = shutdown_requested.await;
    }));

    let (_, mut client) = hub.register().await;
    scenario.bus.deliver(
        QUEUE,
        TicketCommentAdded::EVENT_TYPE,
        serde_json::to_vec(&mocks::comment_added("looking into it")).unwrap(),
    );
    assert!(scenario.bus.wait_for_settlements(1, SETTLE_TIMEOUT).await);

    shutdown.send(()).unwrap();
    let report = tokio::time::timeout(SETTLE_TIMEOUT, running)
        .await
        .expect("run should return after shutdown")
        .unwrap()
        .unwrap();

    assert!(report.fanout_drained);
    assert_eq!(report.endpoints.len(), 1);
    assert_eq!(report.endpoints[0].acked, 1);

    // The realtime action reached the client before the hub closed.
    let text = client.recv().await.unwrap();
    assert!(text.contains("ADD_TICKET_COMMENT"));
    assert!(client.recv().await.is_none());

    assert!(matches!(
        hub.broadcast("ADD_TICKET_COMMENT", serde_json::json!({})).await,
        Err(RealtimeError::Unavailable(_))
    ));
    assert_eq!(scenario.bus.published().len(), 1);
}
