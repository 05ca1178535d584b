//! Command-line entry point for the LumiBridge daemon.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use lumibridge_core::BridgeConfig;
use lumibridge_gateway::{GatewayService, ProtocolEngine, UdpLink};
use lumibridge_mqtt::BusClient;

/// Bridge Lumi/Aqara local gateways onto an MQTT bus.
#[derive(Parser, Debug)]
#[command(name = "lumibridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Debug-level output (RUST_LOG still wins when set).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;

    init_tracing(args.verbose, config.log_level.as_deref());
    info!("lumibridge {} starting", lumibridge_core::VERSION);

    let (bus, commands) = BusClient::connect(&config.mqtt);

    let link = UdpLink::bind(&config.gateway)
        .await
        .context("cannot open the gateway udp socket")?;
    let datagrams = link.incoming();

    let engine = ProtocolEngine::new(&config.gateway, link, bus.clone());
    let service = GatewayService::start(engine, datagrams, commands);

    shutdown_signal().await;

    service.stop().await;
    if let Err(err) = bus.shutdown().await {
        warn!("bus shutdown incomplete: {}", err);
    }
    info!("lumibridge stopped");
    Ok(())
}

/// Level resolution: `RUST_LOG`, then `--verbose`, then the config file's
/// `log_level`, then info. `LUMIBRIDGE_LOG_JSON=true` switches to JSON
/// lines for container environments.
fn init_tracing(verbose: bool, config_level: Option<&str>) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        config_level.unwrap_or("info").to_string()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));

    let json_logging = std::env::var("LUMIBRIDGE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
