mod config;
mod trigger;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rapport_core::clock::SystemClock;
use rapport_core::remote::{HttpBackend, HttpProbe};
use rapport_core::storage::SqliteKv;
use rapport_core::{MutationQueue, ReportStore, SyncDispatcher};

use crate::config::load_syncd_config;
use crate::trigger::{ConnectivityTrigger, TriggerEvent};

#[derive(Parser)]
#[command(name = "rapport-syncd", about = "Background sync daemon for rapport")]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "~/.config/rapport/rapport.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Expand config path
    let config_path = if args.config.starts_with("~/") {
        dirs::home_dir()
            .context("Could not determine home directory")?
            .join(&args.config[2..])
    } else {
        PathBuf::from(args.config)
    };

    let config = load_syncd_config(&config_path)?;

    let server_url = config.server.url.clone().context(
        "No server configured; set [server] url in rapport.toml before running the daemon",
    )?;
    info!(server = %server_url, "rapport-syncd starting");

    let kv = Arc::new(SqliteKv::new(&config.database_path()?)?);
    let clock = Arc::new(SystemClock);
    let queue = Arc::new(MutationQueue::new(kv.clone(), clock.clone()));
    let reports = Arc::new(ReportStore::new(kv, clock));

    let backend = Arc::new(HttpBackend::new(
        &server_url,
        config.server.auth_token.clone(),
        config.request_timeout(),
    )?);
    let probe = Arc::new(HttpProbe::new(&server_url, config.request_timeout())?);

    let dispatcher = SyncDispatcher::new(queue, reports, backend, probe.clone());
    let mut trigger = ConnectivityTrigger::spawn(probe, config.probe_interval());

    // Main event loop
    loop {
        tokio::select! {
            // Connectivity trigger: startup and offline-to-online edges
            event = trigger.recv() => {
                match event {
                    Some(TriggerEvent::Startup) => flush_and_log(&dispatcher, "startup").await,
                    Some(TriggerEvent::CameOnline) => flush_and_log(&dispatcher, "reconnect").await,
                    None => {
                        error!("connectivity trigger closed unexpectedly");
                        break;
                    }
                }
            }

            // Periodic flush, in case a reconnect edge was missed
            _ = tokio::time::sleep(config.flush_interval()) => {
                flush_and_log(&dispatcher, "periodic").await;
            }

            // Handle shutdown signals
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, stopping rapport-syncd");
                break;
            }
        }
    }

    trigger.stop();
    Ok(())
}

/// The background path runs unattended: log failures instead of crashing.
async fn flush_and_log(dispatcher: &SyncDispatcher, cause: &str) {
    match dispatcher.try_flush().await {
        Ok(Some(outcome)) => {
            if outcome.succeeded > 0 || outcome.failed > 0 {
                info!(
                    cause,
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    "flush finished"
                );
            }
        }
        Ok(None) => {} // a pass was already running
        Err(err) => error!(cause, error = %err, "flush failed"),
    }
}
