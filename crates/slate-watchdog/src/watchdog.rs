//! The watchdog loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use slate_registry::ConnectionRegistry;
use slate_tasks::TaskManager;

/// Watchdog sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Tasks in Cancelling longer than this are force-failed.
    pub stale_task_max_age_secs: u64,
    /// Registry entries older than this are purged.
    pub registry_max_age_secs: u64,
    /// Registry ids with this suffix are exempt from the purge
    /// (protects short-lived bookkeeping queries).
    pub ignore_suffix: Option<String>,
    /// Terminal tasks older than this are deleted from the store.
    pub task_retention_hours: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            stale_task_max_age_secs: 1800,
            registry_max_age_secs: 3600,
            ignore_suffix: Some("_cleanup".to_string()),
            task_retention_hours: 168,
        }
    }
}

/// Handle to a running watchdog loop; `stop` shuts it down cleanly.
pub struct WatchdogHandle {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl WatchdogHandle {
    /// Signal the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Periodic recovery sweep over the task manager and the registry.
pub struct Watchdog {
    manager: Arc<TaskManager>,
    registry: Arc<ConnectionRegistry>,
    config: WatchdogConfig,
    started: AtomicBool,
}

impl Watchdog {
    pub fn new(
        manager: Arc<TaskManager>,
        registry: Arc<ConnectionRegistry>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            manager,
            registry,
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the sweep loop. Only the first call spawns anything;
    /// later calls warn and return `None`.
    pub fn start(self: &Arc<Self>) -> Option<WatchdogHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("watchdog already started, ignoring duplicate start");
            return None;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let watchdog = Arc::clone(self);
        let interval = Duration::from_secs(self.config.interval_secs);

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "watchdog started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        watchdog.run_sweep().await;
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("watchdog shutting down");
                        break;
                    }
                }
            }
        });

        Some(WatchdogHandle {
            handle,
            shutdown_tx,
        })
    }

    /// One full sweep. Each stage is best-effort; a failure is logged
    /// and the remaining stages still run.
    pub async fn run_sweep(&self) {
        let stale_task_age = Duration::from_secs(self.config.stale_task_max_age_secs);
        match self.manager.sweep_stuck_cancelling(stale_task_age).await {
            Ok(0) => {}
            Ok(reclaimed) => info!(reclaimed, "force-failed tasks stuck in cancelling"),
            Err(e) => warn!(error = %e, "stuck-cancelling sweep failed"),
        }

        let removed = self.registry.cleanup_stale(
            Duration::from_secs(self.config.registry_max_age_secs),
            self.config.ignore_suffix.as_deref(),
        );
        if removed > 0 {
            info!(removed, "purged stale query registrations");
        }

        let retention = Duration::from_secs(self.config.task_retention_hours * 3600);
        match self.manager.purge_expired(retention).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired old terminal tasks"),
            Err(e) => warn!(error = %e, "task expiry sweep failed"),
        }
    }
}
