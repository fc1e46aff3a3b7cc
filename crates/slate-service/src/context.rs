//! Service context — wiring and lifecycle of the core subsystems.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use slate_engine::ConnectionFactory;
use slate_pool::{ConnectionPool, MaintenanceHandle, PoolStats};
use slate_registry::{ActiveQuery, ConnectionRegistry};
use slate_state::{TaskRecord, TaskStore};
use slate_tasks::TaskManager;
use slate_watchdog::{Watchdog, WatchdogHandle};

use crate::config::ServiceConfig;
use crate::error::ServiceError;

struct Background {
    maintenance: MaintenanceHandle,
    watchdog: Option<WatchdogHandle>,
}

/// The assembled Slate core: pool, registry, task manager, watchdog.
///
/// Constructed once at process start and passed by reference to every
/// consumer; tests build a fresh context each.
pub struct ServiceContext {
    pool: Arc<ConnectionPool>,
    registry: Arc<ConnectionRegistry>,
    manager: Arc<TaskManager>,
    watchdog: Arc<Watchdog>,
    background: Mutex<Option<Background>>,
}

impl ServiceContext {
    /// Wire the core subsystems from their two injected boundaries:
    /// the engine connection factory and the task store.
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        store: Arc<dyn TaskStore>,
        config: ServiceConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = Arc::new(ConnectionPool::new(factory, config.pool));
        let manager = Arc::new(TaskManager::new(store, registry.clone(), config.retry));
        let watchdog = Arc::new(Watchdog::new(
            manager.clone(),
            registry.clone(),
            config.watchdog,
        ));
        info!("service context initialized");
        Arc::new(Self {
            pool,
            registry,
            manager,
            watchdog,
            background: Mutex::new(None),
        })
    }

    fn background_slot(&self) -> MutexGuard<'_, Option<Background>> {
        self.background.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Warm the pool and start the background loops (pool maintenance
    /// and the watchdog). Idempotent: only the first call starts them.
    pub fn start_background(&self) {
        let mut slot = self.background_slot();
        if slot.is_some() {
            warn!("background loops already running");
            return;
        }
        self.pool.warm_up();
        let maintenance = self.pool.start_maintenance();
        let watchdog = self.watchdog.start();
        *slot = Some(Background {
            maintenance,
            watchdog,
        });
        info!("background loops started");
    }

    /// Stop the background loops and close every pooled connection.
    pub async fn shutdown(&self) {
        let background = self.background_slot().take();
        if let Some(background) = background {
            background.maintenance.stop().await;
            if let Some(watchdog) = background.watchdog {
                watchdog.stop().await;
            }
        }
        self.pool.shutdown();
        info!("service context shut down");
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    // ── Read surface ───────────────────────────────────────────────

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.get_stats()
    }

    pub fn active_queries(&self) -> Vec<ActiveQuery> {
        self.registry.snapshot()
    }

    pub fn task(&self, task_id: &str) -> Result<Option<TaskRecord>, ServiceError> {
        Ok(self.manager.get(task_id)?)
    }

    pub fn tasks(&self, limit: usize) -> Result<Vec<TaskRecord>, ServiceError> {
        Ok(self.manager.list(limit)?)
    }
}
