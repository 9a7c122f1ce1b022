// Main entry point - Dependency injection and role startup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::application::connector::TransportConnector;
use crate::application::ingest::run_ingestion;
use crate::application::producer::TelemetryProducer;
use crate::application::scheduler::RefreshScheduler;
use crate::application::store::TelemetryStore;
use crate::infrastructure::config::{AppConfig, load_app_config};
use crate::infrastructure::mqtt_client::MqttBrokerClient;
use crate::presentation::app_state::AppState;
use crate::presentation::frames::FrameRenderer;
use crate::presentation::router::router;

#[derive(Parser)]
#[command(name = "hvac-telemetry", version, about = "HVAC sensor feed over MQTT")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, global = true, default_value = "config/hvac")]
    config: String,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Publish simulated sensor readings
    Sensor,
    /// Ingest the feed and serve the live dashboard API
    Dashboard {
        /// Overrides http.listen
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let app_config = load_app_config(&cli.config)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    match cli.role {
        Role::Sensor => run_sensor(app_config, shutdown).await,
        Role::Dashboard { listen } => run_dashboard(app_config, listen, shutdown).await,
    }
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
        Err(e) => tracing::error!("unable to listen for ctrl-c: {}", e),
    }
}

fn build_connector(app_config: &AppConfig, role: &str) -> Arc<TransportConnector> {
    let client = Arc::new(MqttBrokerClient::new(
        app_config.client_id(role),
        Duration::from_secs(app_config.broker.keep_alive_secs),
    ));
    Arc::new(TransportConnector::new(client, app_config.connector_settings()))
}

async fn run_sensor(app_config: AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let catalog = Arc::new(app_config.catalog());
    let connector = build_connector(&app_config, "sensor");

    let network = tokio::spawn({
        let connector = connector.clone();
        async move { connector.run().await }
    });

    let producer = TelemetryProducer::new(catalog, connector.clone(), app_config.producer_settings());
    producer.run(shutdown).await;

    connector.close().await;
    network.await??;
    Ok(())
}

async fn run_dashboard(
    app_config: AppConfig,
    listen: Option<String>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    // Store lives for the whole process and is shared by reference
    let catalog = Arc::new(app_config.catalog());
    let store = Arc::new(TelemetryStore::new(catalog, app_config.feed.buffer_capacity));

    let connector = build_connector(&app_config, "dashboard");
    let inbound = connector.subscribe(&app_config.feed.topic).await;

    let network = tokio::spawn({
        let connector = connector.clone();
        async move { connector.run().await }
    });
    let ingestion = tokio::spawn(run_ingestion(store.clone(), inbound, shutdown.clone()));

    let renderer = Arc::new(FrameRenderer::new());
    let frames = renderer.subscribe();
    let scheduler = Arc::new(RefreshScheduler::new(
        store.clone(),
        renderer,
        app_config.refresh_interval(),
    ));
    let refresh = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    let state = Arc::new(AppState {
        store,
        scheduler,
        connector: connector.clone(),
        frames,
        shutdown: shutdown.clone(),
    });

    // Start server
    let addr: SocketAddr = listen.unwrap_or(app_config.http.listen).parse()?;
    tracing::info!("Starting hvac dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state))
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;

    shutdown.cancel();
    connector.close().await;
    refresh.await?;
    ingestion.await?;
    network.await??;
    Ok(())
}
