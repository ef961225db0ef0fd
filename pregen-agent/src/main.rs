//! Pre-generation Agent - Main entry point
//!
//! Runs the managed server and an operator console for the slot archive.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pregen_agent::daemon::{self, Agent, ShutdownCoordinator};
use pregen_agent::host::process::ProcessHost;
use pregen_agent::host::ServerControl;
use pregen_agent::{utils, Config};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Write a default configuration file and exit
    #[arg(long, value_name = "FILE")]
    init_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = args.init_config {
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        std::fs::write(&path, Config::default().to_toml()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::default(),
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level, config.log.server_output)?;

    tracing::info!(
        "Starting pregen-agent v{} (server: {}, archive: {})",
        env!("CARGO_PKG_VERSION"),
        config.server.path.display(),
        config.storage.backup_path.display()
    );

    let (host, server_lines) = ProcessHost::new(config.server.clone());
    if config.server.autostart {
        if let Err(e) = host.start().await {
            tracing::error!("Failed to start server: {}", e);
        }
    }

    let mut agent = Agent::new(config, args.config, host.clone())?;

    let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
    let shutdown_rx = shutdown_coordinator.subscribe();
    let signals = {
        let coordinator = Arc::clone(&shutdown_coordinator);
        tokio::spawn(async move { coordinator.wait_for_signal().await })
    };

    tracing::info!("Console ready, type help for a list of commands");
    daemon::run(&mut agent, spawn_console_reader(), server_lines, shutdown_rx).await;

    signals.abort();
    host.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Read operator lines on a dedicated thread, since stdin reads cannot be cancelled
fn spawn_console_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
