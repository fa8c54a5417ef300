//! thermolink - CAN-to-MQTT telemetry gateway daemon.
//!
//! Loads the command catalog and gateway configuration, opens the SocketCAN
//! interface and the MQTT client, then runs every worker under the supervisor
//! until an OS signal or a fatal worker error stops the gateway.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use thermolink::{
    listen_for_signals, Announcer, CanBus, Catalog, Config, Dispatcher, MqttSink, Poller,
    Publisher, Reader, Supervisor, WorkerError, WorkerHandle,
};

/// Capacity of the frame, acknowledgement, and value channels.
const CHANNEL_CAP: usize = 16;

#[derive(Parser)]
#[command(name = "thermolink")]
#[command(about = "CAN-to-MQTT telemetry gateway for Rotex/Daikin HPSU heat pumps")]
#[command(version)]
struct Cli {
    /// Path to the gateway configuration file.
    #[arg(long, env = "THERMOLINK_CONFIG", default_value = "thermolink.yaml")]
    config: PathBuf,

    /// Path to the command catalog file.
    #[arg(long, env = "THERMOLINK_COMMANDS", default_value = "commands.json")]
    commands: PathBuf,

    /// Log gateway internals at debug level (RUST_LOG takes precedence).
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("gateway failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "thermolink=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let catalog = Catalog::load(&cli.commands)
        .with_context(|| format!("load command catalog {}", cli.commands.display()))?;
    info!(path = %cli.commands.display(), commands = catalog.len(), "catalog loaded");

    let config = Config::load(&cli.config)
        .with_context(|| format!("load configuration {}", cli.config.display()))?;
    let subscriptions = config
        .resolve_subscriptions(&catalog)
        .context("resolve subscriptions")?;
    info!(
        interface = %config.can.interface,
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        subscriptions = subscriptions.len(),
        "configuration loaded"
    );

    let socket = Arc::new(
        CanBus::open(&config.can.interface)
            .with_context(|| format!("open CAN interface {}", config.can.interface))?,
    );
    let (sink, connection) = MqttSink::connect(&config.mqtt);
    let sink = Arc::new(sink);

    let (frame_tx, frame_rx) = mpsc::channel(CHANNEL_CAP);
    let (ack_tx, ack_rx) = mpsc::channel(CHANNEL_CAP);
    let (value_tx, value_rx) = mpsc::channel(CHANNEL_CAP);

    let reader = Reader::new(socket.clone(), frame_tx);
    let poller = Poller::new(socket.clone(), subscriptions.clone(), ack_rx);
    let dispatcher = Dispatcher::new(
        frame_rx,
        catalog.commands().cloned().collect(),
        ack_tx,
        value_tx,
    );
    let publisher = Publisher::new(
        sink.clone(),
        value_rx,
        config.mqtt.value_topic_prefix.clone(),
    );
    let announcer = Announcer::new(sink.clone(), subscriptions, &config);

    let root = CancellationToken::new();
    let handles = vec![
        WorkerHandle::spawn("reader", &root, move |token| async move {
            reader.run(token).await.map_err(WorkerError::bus)
        }),
        WorkerHandle::spawn("poller", &root, move |token| async move {
            poller.run(token).await.map_err(WorkerError::bus)
        }),
        WorkerHandle::spawn("dispatcher", &root, move |token| async move {
            dispatcher.run(token).await.map_err(WorkerError::dispatch)
        }),
        WorkerHandle::spawn("publisher", &root, move |token| async move {
            publisher.run(token).await.map_err(WorkerError::broker)
        }),
        WorkerHandle::spawn("announcer", &root, move |token| async move {
            announcer.run(token).await.map_err(WorkerError::broker)
        }),
        WorkerHandle::spawn("mqtt", &root, move |token| async move {
            connection.run(token).await.map_err(WorkerError::broker)
        }),
        WorkerHandle::spawn("signals", &root, listen_for_signals),
    ];
    info!(workers = handles.len(), "gateway started");

    let result = Supervisor::new(config.shutdown_grace).run(handles).await;

    // The socket outlives every worker; this handle is the last one.
    drop(socket);

    info!("gateway stopped");
    result.map_err(Into::into)
}
