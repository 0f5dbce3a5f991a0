//! Ticketflow projection service.
//!
//! This binary:
//! - Connects the Postgres read model and applies migrations
//! - Connects to Redpanda for inbound domain events and outbound integration
//!   events
//! - Serves realtime actions to UI clients over `/ws`
//! - Exposes Prometheus metrics on `/metrics`
//! - Runs until Ctrl+C or SIGTERM, then shuts down in order
//!
//! # Usage
//!
//! ```bash
//! BROKER_USERNAME=ticketflow BROKER_PASSWORD=secret cargo run -p ticketflow-server
//! ```

use anyhow::Context;
use std::sync::Arc;
use ticketflow_core::event_bus::EventBus;
use ticketflow_runtime::metrics::MetricsServer;
use ticketflow_server::{
    Application, Config, assemble, connect_broker, connect_stores, shutdown_signal,
};
use ticketflow_web::WebSocketHub;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketflow=info,sqlx=warn,rdkafka=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ticketflow projection service...");

    let config = Config::load().context("invalid configuration")?;
    tracing::info!(?config, "Configuration loaded");

    let metrics_addr = config.metrics_addr()?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start().context("failed to install metrics recorder")?;

    let stores = connect_stores(&config)
        .await
        .context("failed to connect the read model")?;
    tracing::info!("✓ Read model connected");

    let bus: Arc<dyn EventBus> =
        Arc::new(connect_broker(&config).context("failed to create the event bus")?);
    tracing::info!(brokers = %config.broker.host, "✓ Event bus connected");

    let hub = WebSocketHub::with_limits(
        config.realtime_client_timeout(),
        config.realtime.client_buffer,
    );
    let pipeline = assemble(&config, stores, bus, Arc::new(hub.clone()))
        .context("failed to assemble the projection pipeline")?;

    let http = TcpListener::bind(config.http_addr()?)
        .await
        .context("failed to bind the HTTP listener")?;
    let metrics_listener = TcpListener::bind(metrics_addr)
        .await
        .context("failed to bind the metrics listener")?;

    let app = Application::new(
        http,
        ticketflow_web::router(hub.clone()),
        pipeline,
        hub,
        config.shutdown_timeout(),
    )
    .with_metrics(metrics_listener, Arc::new(metrics));

    tracing::info!("Ticketflow is running, press Ctrl+C to shut down");
    let report = app.run(shutdown_signal()).await?;

    tracing::info!(
        endpoints = report.endpoints.len(),
        fanout_drained = report.fanout_drained,
        "Ticketflow stopped"
    );
    Ok(())
}
