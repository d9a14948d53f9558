//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and the process-wide resilience instance
//! - Start background tasks (config reload, probes, admin API)
//! - Wait for a signal, then shut every task down
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The admin listener starts last

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::admin;
use crate::config::loader::{load_config, ConfigError};
use crate::config::watcher::{apply_updates, ConfigWatcher};
use crate::config::ResilienceConfig;
use crate::lifecycle::signals::wait_for_shutdown_signal;
use crate::lifecycle::Shutdown;
use crate::observability::{logging, metrics};
use crate::probe::ProbeMonitor;
use crate::resilience::Resilience;

/// Background tasks get this long to exit after the signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("admin API error: {0}")]
    Admin(#[from] std::io::Error),
}

/// Run the daemon until SIGINT/SIGTERM.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), StartupError> {
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        policies = config.policies.len(),
        probes = config.probes.len(),
        "resilience-core starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let resilience = Resilience::init_global(config.clone());
    let shutdown = Shutdown::new();
    let mut tasks = JoinSet::new();

    // Kept alive for the lifetime of the process; dropping it stops the watch.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            let handle = watcher.run()?;
            tasks.spawn(apply_updates(resilience.clone(), updates, shutdown.subscribe()));
            Some(handle)
        }
        None => None,
    };

    let monitor = ProbeMonitor::new(resilience.clone(), config.probes.clone());
    tasks.spawn(monitor.run(shutdown.subscribe()));

    if config.admin.enabled {
        let resilience = resilience.clone();
        let admin_config = config.admin.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = admin::serve(resilience, &admin_config, shutdown).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    wait_for_shutdown_signal().await;
    shutdown.trigger();

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Background tasks did not stop in time");
        tasks.abort_all();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
