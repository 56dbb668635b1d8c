use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, Command};
use contam_daemon::{
    api::AppState,
    config::{load_config, DEFAULT_CONFIG_PATH},
    controller::AcquisitionController,
    server,
};
use contam_sensor::{DeviceState, SerialOpener};
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "contam_daemon=debug,contam_sensor=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Contamination monitor daemon starting...");

    // --- Argument Parsing ---
    let matches = Command::new("contam_daemon")
        .about("Food contamination sensor daemon")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Path to the JSON configuration file"),
        )
        .arg(
            Arg::new("connect")
                .long("connect")
                .value_name("PORT")
                .help("Serial port to connect to at startup"),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .value_name("RATE")
                .value_parser(clap::value_parser!(u32))
                .help("Baud rate for --connect (defaults to the configured rate)"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path)?;
    tracing::info!(
        "Loaded configuration from {} (default sample type: {})",
        config_path.display(),
        config.default_sample_type
    );

    // --- Centralized State ---
    let controller = Arc::new(AcquisitionController::new(
        DeviceState::new(),
        Arc::new(SerialOpener),
        config.read_timeout(),
    ));

    if let Err(e) = controller.capability() {
        tracing::warn!("Serial links unavailable, streaming simulated data only: {}", e);
    }

    let startup_port = matches
        .get_one::<String>("connect")
        .cloned()
        .or_else(|| config.serial.auto_connect.clone());
    if let Some(port) = startup_port {
        let baud_rate = matches
            .get_one::<u32>("baud")
            .copied()
            .unwrap_or(config.serial.default_baud_rate);
        if let Err(e) = controller.connect(&port, baud_rate) {
            tracing::error!("Startup connect to {} failed: {}", port, e);
        }
    }

    let addr = config.socket_addr()?;
    let app_state = AppState {
        controller: controller.clone(),
        config: Arc::new(config),
    };

    // --- Server Task ---
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let server_handle = tokio::spawn(server::run(app_state, addr, shutdown_rx));

    // --- Graceful Shutdown ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received. Stopping services...");

    let stopping = controller.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || stopping.shutdown()).await {
        tracing::error!("Acquisition shutdown task failed: {}", e);
    }

    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("HTTP server error: {}", e),
        Err(e) => tracing::error!("HTTP server task failed: {}", e),
    }

    tracing::info!("Contamination monitor daemon stopped gracefully.");
    Ok(())
}
