//! Configuration file watcher for hot reload.
//!
//! Only configurations that parse and validate are forwarded; a broken edit
//! leaves the running policies in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::ResilienceConfig;
use crate::resilience::Resilience;

/// Watches one config file and forwards every valid revision.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ResilienceConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ResilienceConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let reload_path = path.clone();

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                reload(&reload_path, &update_tx);
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = ?e, "Config watch error"),
        };

        let mut watcher = RecommendedWatcher::new(
            handler,
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<ResilienceConfig>) {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(
                path = ?path,
                policies = config.policies.len(),
                breakers = config.breakers.len(),
                "Config change detected"
            );
            if tx.send(config).is_err() {
                tracing::debug!("Config update receiver dropped");
            }
        }
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to reload config, keeping current policies");
        }
    }
}

/// Apply forwarded configs to `resilience` until shutdown or the sender closes.
pub async fn apply_updates(
    resilience: Arc<Resilience>,
    mut updates: mpsc::UnboundedReceiver<ResilienceConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => resilience.apply_config(&config),
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config reload task exiting");
}
