//! Sensor monitor - main entry point

use clap::{Parser, Subcommand};
use sensor_monitor::config::MonitorConfig;
use sensor_monitor::history::{HistorySource, HttpHistoryClient};
use sensor_monitor::lifecycle::{HostLifecycle, LifecycleSignal};
use sensor_monitor::observability::{init_default_logging, StatusServer};
use sensor_monitor::session::{SessionManager, SessionSnapshot};
use sensor_monitor::transport::mqtt::MqttTransportFactory;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// MQTT sensor subscriber with connection health tracking
#[derive(Parser)]
#[command(name = "sensor-monitor")]
#[command(about = "Subscribe to a live sensor topic and track connection health")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor session until SIGINT/SIGTERM
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Fetch persisted readings from the history endpoint
    History,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting sensor-monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_session(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::History => fetch_history(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            MonitorConfig::load_from_file(path)?
        }
        None => {
            let default_paths = ["sensor-monitor.toml", "config/sensor-monitor.toml"];
            match default_paths.iter().map(PathBuf::from).find(|path| path.exists()) {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    MonitorConfig::load_from_file(&path)?
                }
                None => {
                    warn!("No configuration file found, relying on environment variables");
                    MonitorConfig::default()
                }
            }
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

async fn run_session(config: MonitorConfig) -> CliResult {
    let lifecycle = Arc::new(HostLifecycle::new(LifecycleSignal::Active));
    let mut session = SessionManager::new(config.mqtt.clone());

    let snapshot_logger = tokio::spawn(log_snapshots(session.subscribe()));

    let (stop_status, status_stopped) = oneshot::channel::<()>();
    if let Some(status) = &config.status {
        let server = StatusServer::new(status.port, session.subscribe());
        tokio::spawn(async move {
            let shutdown = async {
                let _ = status_stopped.await;
            };
            if let Err(e) = server.run_until(shutdown).await {
                error!("Status server error: {}", e);
            }
        });
    }

    session.start(&MqttTransportFactory, lifecycle.clone())?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    info!("Sensor session running (SIGUSR1 = background, SIGUSR2 = active)");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = sigusr1.recv() => lifecycle.notify(LifecycleSignal::Background),
            _ = sigusr2.recv() => lifecycle.notify(LifecycleSignal::Active),
        }
    }

    session.shutdown().await;
    let _ = stop_status.send(());
    snapshot_logger.abort();
    Ok(())
}

async fn log_snapshots(mut snapshots: watch::Receiver<SessionSnapshot>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let latest = snapshot.latest_reading.as_ref().and_then(|reading| reading.value);
        info!(
            state = ?snapshot.connection_state,
            latest = ?latest,
            window = snapshot.history.len(),
            error = snapshot.last_error_message().unwrap_or(""),
            "Session snapshot updated"
        );
    }
}

fn handle_config_command(config: &MonitorConfig, show: bool) -> CliResult {
    sensor_monitor::config::validate_broker_settings(&config.mqtt.broker_url, &config.mqtt.topic)?;

    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

async fn fetch_history(config: &MonitorConfig) -> CliResult {
    let section = config
        .history
        .as_ref()
        .ok_or("No [history] section configured")?;
    let client = HttpHistoryClient::from_section(section)?;

    let readings = client.fetch_history().await?;
    info!("Fetched {} persisted readings", readings.len());
    println!("{}", serde_json::to_string_pretty(&readings)?);
    Ok(())
}
