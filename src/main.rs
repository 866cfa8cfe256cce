//! Telemetry agent entry point
//!
//! Startup order: configuration, sensor source, MQTT transport, connect,
//! publish loop. Any failure before the loop starts exits with status 1.

use clap::Parser;
use std::process;
use telemetry_agent::agent::AgentLoop;
use telemetry_agent::config::AgentConfig;
use telemetry_agent::error::{AgentError, AgentResult};
use telemetry_agent::observability::init_default_logging;
use telemetry_agent::publisher::Publisher;
use telemetry_agent::sensor::open_sensor_source;
use telemetry_agent::shutdown::{shutdown_channel, ShutdownTx};
use telemetry_agent::transport::mqtt::MqttClient;
use tokio::signal;
use tracing::{error, info};

/// Periodic sensor telemetry publisher
#[derive(Parser)]
#[command(name = "telemetry-agent")]
#[command(about = "Publishes light, temperature and humidity readings over MQTT")]
#[command(version)]
struct Cli {
    /// Publish fixed synthetic readings instead of reading the sensors
    #[arg(short, long)]
    demo: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!(
        "Starting telemetry agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run_agent(cli.demo).await {
        error!(fatal = e.is_fatal_configuration(), "Agent failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration() -> AgentResult<AgentConfig> {
    let path = AgentConfig::discover()?;
    info!("Loading configuration from: {}", path.display());
    Ok(AgentConfig::load_from_file(&path)?)
}

async fn run_agent(demo: bool) -> AgentResult<()> {
    let config = load_configuration()?;
    info!(device_id = %config.device.id, "Configuration loaded");

    let sensor = open_sensor_source(demo, &config.sensors)?;

    let transport = MqttClient::new(
        config.mqtt_client_id(),
        &config.mqtt,
        &config.credential_paths(),
    )?;

    let mut agent = AgentLoop::new(&config, sensor, Publisher::new(transport));
    agent.start().await?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let signals = tokio::spawn(wait_for_shutdown_signal(shutdown_tx));

    let result = agent.run(shutdown_rx).await;

    info!("Application shutdown initiated");
    if let Err(e) = agent.stop().await {
        error!("Error during shutdown: {}", e);
    }
    signals.abort();

    result
}

/// Flip the shutdown signal on SIGINT or SIGTERM
async fn wait_for_shutdown_signal(shutdown_tx: ShutdownTx) -> Result<(), AgentError> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| AgentError::internal(format!("SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| AgentError::internal(format!("SIGTERM handler: {e}")))?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    // receiver only goes away once the loop has already stopped
    let _ = shutdown_tx.send(true);
    Ok(())
}
