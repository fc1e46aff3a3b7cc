//! Background maintenance loop for the connection pool.
//!
//! A cancellable periodic task: every `maintenance_interval` it closes
//! idle connections past their timeout and re-probes quarantined ones.
//! Sweep failures are logged, never propagated — a maintenance hiccup
//! must not take down the serving path.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::pool::ConnectionPool;

/// Handle to a running maintenance loop; `stop` shuts it down cleanly.
pub struct MaintenanceHandle {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl MaintenanceHandle {
    /// Signal the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

impl ConnectionPool {
    /// Spawn the periodic maintenance loop for this pool.
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pool = Arc::clone(self);
        let interval = pool.config().maintenance_interval();

        let handle = tokio::spawn(async move {
            debug!(interval_secs = interval.as_secs(), "pool maintenance loop starting");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        pool.run_maintenance();
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("pool maintenance loop shutting down");
                        break;
                    }
                }
            }
        });

        MaintenanceHandle {
            handle,
            shutdown_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use slate_engine::stub::StubFactory;
    use std::time::Duration;

    #[tokio::test]
    async fn maintenance_loop_starts_and_stops() {
        let factory = Arc::new(StubFactory::new());
        let pool = Arc::new(ConnectionPool::new(factory, PoolConfig::default()));

        let handle = pool.start_maintenance();
        handle.stop().await;
    }

    #[tokio::test]
    async fn maintenance_loop_closes_expired_idle() {
        let factory = Arc::new(StubFactory::new());
        let config = PoolConfig {
            min_connections: 0,
            max_connections: 2,
            connection_timeout_ms: 100,
            idle_timeout_secs: 0,
            max_retries: 3,
            maintenance_interval_secs: 1,
        };
        let pool = Arc::new(ConnectionPool::new(factory, config));

        let lease = pool.acquire().await.unwrap();
        pool.release(lease);
        assert_eq!(pool.get_stats().total, 1);

        let handle = pool.start_maintenance();
        // One sweep fires after ~1s.
        tokio::time::sleep(Duration::from_millis(1300)).await;
        handle.stop().await;

        assert_eq!(pool.get_stats().total, 0);
    }
}
