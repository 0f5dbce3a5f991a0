//! Wiring shared by the projection integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use ticketflow_core::read_model::AuditIdStrategy;
use ticketflow_projections::{IntegrationPublisher, ProjectionContext, RealtimeNotifier};
use ticketflow_runtime::FanoutTracker;
use ticketflow_testing::mocks::Scenario;

pub const INTEGRATION_TOPIC: &str = "ticket-integration";

pub fn context(scenario: &Scenario, audit_ids: AuditIdStrategy) -> ProjectionContext {
    ProjectionContext {
        tickets: Arc::new(scenario.tickets.clone()),
        priorities: Arc::new(scenario.priorities.clone()),
        statuses: Arc::new(scenario.statuses.clone()),
        audit: Arc::new(scenario.audit.clone()),
        notifier: RealtimeNotifier::new(Arc::new(scenario.realtime.clone())),
        publisher: IntegrationPublisher::new(Arc::new(scenario.bus.clone()), INTEGRATION_TOPIC),
        fanout: FanoutTracker::new(),
        audit_ids,
    }
}

pub async fn drain(context: &ProjectionContext) {
    assert!(
        context.fanout.drain_with_timeout(Duration::from_secs(5)).await,
        "fan-out did not finish"
    );
}
