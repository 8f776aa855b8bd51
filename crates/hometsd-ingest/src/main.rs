//! hometsd-ingest binary entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hometsd_ingest::buffer::MessageBuffer;
use hometsd_ingest::dispatch::Dispatcher;
use hometsd_ingest::handler::default_registry;
use hometsd_ingest::sink::PostgresSink;
use hometsd_ingest::transport::run_mqtt_source;
use hometsd_ingest::Config;

#[derive(Parser, Debug)]
#[command(name = "hometsd-ingest")]
#[command(about = "MQTT to TimescaleDB ingestor for home sensor telemetry")]
struct Args {
    /// Path to ingestor configuration file
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config).map_err(|e| {
        error!(error = %e, "failed to load config");
        e
    })?;
    let poll_interval = config.poll.parse_interval()?;

    info!(
        mqtt_url = %config.mqtt.url,
        topics = config.mqtt.topics.len(),
        postgres_host = %config.postgres.host,
        dbname = %config.postgres.dbname,
        poll_interval = ?poll_interval,
        "starting ingestor"
    );

    // Credentials come from the environment, never the config file
    let password = std::env::var("PG_PASSWORD").ok();
    if password.is_none() {
        warn!("PG_PASSWORD not set, connecting without a password");
    }

    let sink = PostgresSink::connect(&config.postgres, password.as_deref()).await?;

    let buffer = Arc::new(MessageBuffer::new());
    let shutdown = CancellationToken::new();

    // Transport task: feeds the buffer until cancelled. A transport
    // failure is fatal - cancel the loop so the process exits and the
    // supervisor restarts it.
    let transport_buffer = Arc::clone(&buffer);
    let transport_shutdown = shutdown.clone();
    let mqtt_config = config.mqtt.clone();
    let transport = tokio::spawn(async move {
        if let Err(e) = run_mqtt_source(&mqtt_config, transport_buffer, transport_shutdown.clone()).await {
            error!(error = %e, "transport failed, shutting down");
            transport_shutdown.cancel();
        }
    });

    // Signal handling: SIGTERM/SIGINT cancel the dispatch loop
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to create SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to create SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
        }
        signal_shutdown.cancel();
    });

    let mut dispatcher = Dispatcher::new(buffer, default_registry(), sink, poll_interval);
    dispatcher.run(shutdown).await;

    transport.await.ok();
    info!("ingestor stopped");
    Ok(())
}
