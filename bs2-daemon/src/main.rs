//! BS2 controller daemon (bs2d)
//!
//! Long-running process that reads CPU/GPU temperatures, runs the adaptive
//! control core, and commands the BS2 / BS2 PRO fan. One single-threaded
//! control loop; UI front-ends talk to it through the message queue.

mod control_loop;
mod temperature;
mod transport;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use control_loop::{control_channel, ControlLoop, ControlMessage, JsonConfigStore, TelemetrySnapshot};
use temperature::HwmonProvider;
use transport::LoggingTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "bs2d", version, about = "Adaptive fan control daemon for the BS2 / BS2 PRO")]
struct Cli {
    /// Configuration file path (defaults to ~/.config/bs2/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter (overrides BS2_LOG)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .or_else(|| std::env::var("BS2_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level.as_str())
        .init();

    info!("STARTUP: bs2d {}", VERSION);

    let store = match cli.config {
        Some(path) => {
            info!("STARTUP: config file {:?}", path);
            JsonConfigStore::new(path)
        }
        None => JsonConfigStore::at_default_path(),
    };

    let (control_tx, control_queue) = control_channel();
    let (telemetry_tx, _telemetry_rx) = tokio::sync::watch::channel(TelemetrySnapshot::default());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        // The send wakes the loop out of its sleep, so shutdown is immediate
        if let Err(e) = ctrlc::set_handler(move || {
            info!("SIGNAL: shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
            control_tx.send(ControlMessage::Shutdown);
        }) {
            warn!("Failed to install signal handler: {}", e);
        }
    }

    let control = ControlLoop::new(
        store,
        HwmonProvider::new(),
        LoggingTransport::new(),
        control_queue,
        telemetry_tx,
    );

    let handle = tokio::spawn(control.run(shutdown));
    if let Err(e) = handle.await {
        error!("Control loop task failed: {}", e);
        std::process::exit(1);
    }

    info!("SHUTDOWN: bs2d terminated");
    Ok(())
}
