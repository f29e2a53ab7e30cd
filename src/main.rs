//! Sockswatch - System Proxy Watcher
//!
//! This is the main entry point for the sockswatch binary: it watches the
//! environment for proxy changes and reports each transition.

use anyhow::Result;
use clap::Parser;
use sockswatch::config::{load_config, Config};
use sockswatch::proxy::{EnvSnapshotProvider, ProxyMonitor};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sockswatch - watch system proxy settings and report changes
#[derive(Parser, Debug)]
#[command(name = "sockswatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Err(e) = config.monitor.validate() {
        anyhow::bail!("Invalid monitor configuration: {}", e);
    }

    info!("Sockswatch v{}", sockswatch::VERSION);
    info!(
        "Polling system proxy every {}s",
        config.monitor.poll_interval_secs
    );

    // Setup shutdown signal
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    // Watch for proxy changes until shutdown
    let monitor = ProxyMonitor::with_interval(
        EnvSnapshotProvider::new(),
        config.monitor.poll_interval(),
    );
    monitor.start(|endpoint| match endpoint {
        Some(endpoint) => info!(proxy = %endpoint, "System proxy changed"),
        None => info!("System proxy removed"),
    });

    let _ = shutdown_rx.recv().await;
    monitor.stop();
    info!("Sockswatch stopped");
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
