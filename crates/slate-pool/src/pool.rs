//! Connection pool — exclusive leases over a bounded set of engine
//! connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use slate_engine::{ConnectionFactory, EngineConnection};

use crate::error::{PoolError, PoolResult};

/// Configuration for a connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum number of connections to keep open.
    pub min_connections: u32,
    /// Maximum number of connections allowed.
    pub max_connections: u32,
    /// Default wait bound for `acquire`.
    pub connection_timeout_ms: u64,
    /// Idle connections older than this are closed by maintenance.
    pub idle_timeout_secs: u64,
    /// Errors tolerated on one connection before it is evicted.
    pub max_retries: u32,
    /// Interval between maintenance sweeps.
    pub maintenance_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            connection_timeout_ms: 30_000,
            idle_timeout_secs: 600,
            max_retries: 3,
            maintenance_interval_secs: 60,
        }
    }
}

impl PoolConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Open and available for acquisition.
    Idle,
    /// Exclusively held by one caller.
    Busy,
    /// Quarantined after a runtime error, pending reset.
    Error,
    /// Closed; the entry is about to be dropped.
    Closed,
}

struct PoolEntry {
    id: u64,
    handle: Arc<dyn EngineConnection>,
    state: ConnState,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
    error_count: u32,
}

/// An exclusive lease on one pooled connection.
///
/// Must be returned via [`ConnectionPool::release`] or
/// [`ConnectionPool::mark_error`]; while leased, no other caller can
/// execute on the same handle.
pub struct ConnectionLease {
    conn_id: u64,
    handle: Arc<dyn EngineConnection>,
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

impl ConnectionLease {
    /// Pool-internal id of the leased connection.
    pub fn id(&self) -> u64 {
        self.conn_id
    }

    /// The engine connection handle.
    pub fn connection(&self) -> &Arc<dyn EngineConnection> {
        &self.handle
    }
}

/// Diagnostic view of one pooled connection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub state: String,
    pub age_secs: u64,
    pub idle_secs: u64,
    pub use_count: u64,
    pub error_count: u32,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub error: usize,
    /// Cumulative connections created.
    pub created: u64,
    /// Cumulative connections closed.
    pub closed: u64,
    /// Cumulative connection errors observed.
    pub errors: u64,
}

struct PoolInner {
    entries: HashMap<u64, PoolEntry>,
    next_id: u64,
    /// Slots reserved for connections currently being opened; counted
    /// against `max_connections` so concurrent creators cannot overshoot.
    creating: u32,
    created: u64,
    closed: u64,
    errors: u64,
    shutdown: bool,
}

enum TryAcquire {
    Lease(ConnectionLease),
    Create,
    Wait,
}

/// Bounded pool of engine connections.
pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    /// Wakes one waiter when a slot or idle connection frees up.
    available: Notify,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                next_id: 0,
                creating: 0,
                created: 0,
                closed: 0,
                errors: 0,
                shutdown: false,
            }),
            available: Notify::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-open connections up to `min_connections`.
    ///
    /// Creation failures here are logged, not fatal: the pool will keep
    /// trying on demand. Returns how many connections were opened.
    pub fn warm_up(&self) -> usize {
        let mut warmed = 0;
        loop {
            {
                let mut inner = self.lock();
                if inner.shutdown
                    || inner.entries.len() as u32 + inner.creating >= self.config.min_connections
                {
                    break;
                }
                inner.creating += 1;
            }
            match self.factory.connect() {
                Ok(handle) => {
                    let mut inner = self.lock();
                    inner.creating -= 1;
                    let id = inner.next_id;
                    inner.next_id += 1;
                    let now = Instant::now();
                    inner.entries.insert(
                        id,
                        PoolEntry {
                            id,
                            handle,
                            state: ConnState::Idle,
                            created_at: now,
                            last_used: now,
                            use_count: 0,
                            error_count: 0,
                        },
                    );
                    inner.created += 1;
                    warmed += 1;
                }
                Err(e) => {
                    let mut inner = self.lock();
                    inner.creating -= 1;
                    inner.errors += 1;
                    drop(inner);
                    warn!(error = %e, "warm-up connection creation failed");
                    break;
                }
            }
        }
        if warmed > 0 {
            info!(warmed, min = self.config.min_connections, "connection pool warmed");
        }
        warmed
    }

    /// Acquire a connection, waiting up to the configured timeout.
    pub async fn acquire(&self) -> PoolResult<ConnectionLease> {
        self.acquire_timeout(self.config.connection_timeout()).await
    }

    /// Acquire a connection, waiting up to `timeout`.
    ///
    /// Prefers an idle connection; creates a new one while under
    /// `max_connections`; otherwise waits for a release. Waiters race on
    /// wakeup — no FIFO ordering is guaranteed.
    pub async fn acquire_timeout(&self, timeout: Duration) -> PoolResult<ConnectionLease> {
        let deadline = Instant::now() + timeout;
        loop {
            // Created before the scan: a `notify_one` that fires between
            // the scan and the await stores a permit this future picks up.
            let notified = self.available.notified();

            match self.try_acquire()? {
                TryAcquire::Lease(lease) => return Ok(lease),
                TryAcquire::Create => return self.create_connection(),
                TryAcquire::Wait => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoolError::Exhausted(timeout));
                    }
                    if tokio::time::timeout(deadline - now, notified).await.is_err() {
                        return Err(PoolError::Exhausted(timeout));
                    }
                }
            }
        }
    }

    fn try_acquire(&self) -> PoolResult<TryAcquire> {
        let mut inner = self.lock();
        if inner.shutdown {
            return Err(PoolError::Closed);
        }

        if let Some(entry) = inner.entries.values_mut().find(|e| e.state == ConnState::Idle) {
            entry.state = ConnState::Busy;
            entry.last_used = Instant::now();
            entry.use_count += 1;
            let lease = ConnectionLease {
                conn_id: entry.id,
                handle: entry.handle.clone(),
            };
            let conn_id = entry.id;
            // Wakeup permits coalesce; if more idle connections remain,
            // pass the baton so a second waiter rescans too.
            if inner.entries.values().any(|e| e.state == ConnState::Idle) {
                self.available.notify_one();
            }
            debug!(conn_id, "acquired idle connection");
            return Ok(TryAcquire::Lease(lease));
        }

        if inner.entries.len() as u32 + inner.creating < self.config.max_connections {
            inner.creating += 1;
            return Ok(TryAcquire::Create);
        }

        Ok(TryAcquire::Wait)
    }

    /// Open a new connection for a reserved slot; the slot is given back
    /// on failure.
    fn create_connection(&self) -> PoolResult<ConnectionLease> {
        let result = self.factory.connect();
        let mut inner = self.lock();
        inner.creating -= 1;
        match result {
            Ok(handle) => {
                let id = inner.next_id;
                inner.next_id += 1;
                let now = Instant::now();
                inner.entries.insert(
                    id,
                    PoolEntry {
                        id,
                        handle: handle.clone(),
                        state: ConnState::Busy,
                        created_at: now,
                        last_used: now,
                        use_count: 1,
                        error_count: 0,
                    },
                );
                inner.created += 1;
                debug!(conn_id = id, total = inner.entries.len(), "created pool connection");
                Ok(ConnectionLease { conn_id: id, handle })
            }
            Err(e) => {
                inner.errors += 1;
                drop(inner);
                // The reserved slot is free again for another caller.
                self.available.notify_one();
                warn!(error = %e, "connection creation failed");
                Err(PoolError::CreationFailed(e))
            }
        }
    }

    /// Return a healthy connection to the pool.
    pub fn release(&self, lease: ConnectionLease) {
        let mut inner = self.lock();
        if inner.shutdown {
            drop(inner);
            lease.handle.close();
            return;
        }
        match inner.entries.get_mut(&lease.conn_id) {
            Some(entry) => {
                entry.state = ConnState::Idle;
                entry.last_used = Instant::now();
                drop(inner);
                self.available.notify_one();
                debug!(conn_id = lease.conn_id, "connection released");
            }
            None => {
                drop(inner);
                warn!(conn_id = lease.conn_id, "released connection not tracked by pool");
            }
        }
    }

    /// Report a runtime error on a leased connection.
    ///
    /// The connection is quarantined and probed: a passing probe returns
    /// it to Idle, a failing one closes it. Once `max_retries` errors
    /// accumulate the connection is evicted outright.
    pub fn mark_error(&self, lease: ConnectionLease, message: &str) {
        let reset_handle = {
            let mut inner = self.lock();
            inner.errors += 1;
            let Some(entry) = inner.entries.get_mut(&lease.conn_id) else {
                drop(inner);
                warn!(conn_id = lease.conn_id, "errored connection not tracked by pool");
                return;
            };
            entry.error_count += 1;
            warn!(
                conn_id = lease.conn_id,
                error_count = entry.error_count,
                %message,
                "connection reported an error"
            );
            if entry.error_count >= self.config.max_retries {
                let handle = Self::close_entry(&mut inner, lease.conn_id);
                drop(inner);
                if let Some(handle) = handle {
                    handle.close();
                }
                self.available.notify_one();
                info!(conn_id = lease.conn_id, "connection evicted after repeated errors");
                return;
            }
            entry.state = ConnState::Error;
            entry.handle.clone()
        };
        self.try_reset(lease.conn_id, reset_handle);
    }

    /// Probe a quarantined connection and return it to service or close it.
    fn try_reset(&self, conn_id: u64, handle: Arc<dyn EngineConnection>) {
        match handle.probe() {
            Ok(()) => {
                let mut inner = self.lock();
                if let Some(entry) = inner.entries.get_mut(&conn_id) {
                    entry.state = ConnState::Idle;
                    entry.last_used = Instant::now();
                    drop(inner);
                    self.available.notify_one();
                    debug!(conn_id, "connection reset after error");
                }
            }
            Err(e) => {
                let mut inner = self.lock();
                let removed = Self::close_entry(&mut inner, conn_id);
                drop(inner);
                if let Some(handle) = removed {
                    handle.close();
                }
                self.available.notify_one();
                warn!(conn_id, error = %e, "connection failed reset probe, closed");
            }
        }
    }

    /// Mark an entry closed and remove it. Returns the handle to close
    /// outside the lock.
    fn close_entry(inner: &mut PoolInner, conn_id: u64) -> Option<Arc<dyn EngineConnection>> {
        let mut entry = inner.entries.remove(&conn_id)?;
        entry.state = ConnState::Closed;
        inner.closed += 1;
        Some(entry.handle)
    }

    /// Close idle connections past `idle_timeout` (never shrinking below
    /// `min_connections`), then re-probe quarantined connections.
    ///
    /// Errors never escape a sweep; this is also the body of the
    /// background maintenance loop.
    pub fn run_maintenance(&self) {
        let idle_timeout = self.config.idle_timeout();

        let to_close: Vec<(u64, Arc<dyn EngineConnection>)> = {
            let mut inner = self.lock();
            if inner.shutdown {
                return;
            }
            let mut expired: Vec<(Instant, u64)> = inner
                .entries
                .values()
                .filter(|e| e.state == ConnState::Idle && e.last_used.elapsed() >= idle_timeout)
                .map(|e| (e.last_used, e.id))
                .collect();
            // Oldest first, and only down to the configured minimum.
            expired.sort_by_key(|(last_used, _)| *last_used);
            let closable = inner
                .entries
                .len()
                .saturating_sub(self.config.min_connections as usize);
            expired.truncate(closable);
            expired
                .into_iter()
                .filter_map(|(_, id)| Self::close_entry(&mut inner, id).map(|h| (id, h)))
                .collect()
        };
        for (conn_id, handle) in &to_close {
            handle.close();
            debug!(conn_id, "closed idle connection past timeout");
        }

        let quarantined: Vec<(u64, Arc<dyn EngineConnection>)> = {
            let inner = self.lock();
            inner
                .entries
                .values()
                .filter(|e| e.state == ConnState::Error)
                .map(|e| (e.id, e.handle.clone()))
                .collect()
        };
        for (conn_id, handle) in quarantined {
            self.try_reset(conn_id, handle);
        }
    }

    /// Current pool statistics.
    pub fn get_stats(&self) -> PoolStats {
        let inner = self.lock();
        let mut stats = PoolStats {
            total: inner.entries.len(),
            idle: 0,
            busy: 0,
            error: 0,
            created: inner.created,
            closed: inner.closed,
            errors: inner.errors,
        };
        for entry in inner.entries.values() {
            match entry.state {
                ConnState::Idle => stats.idle += 1,
                ConnState::Busy => stats.busy += 1,
                ConnState::Error => stats.error += 1,
                ConnState::Closed => {}
            }
        }
        stats
    }

    /// Diagnostic view of every pooled connection.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let inner = self.lock();
        inner
            .entries
            .values()
            .map(|entry| ConnectionInfo {
                id: entry.id,
                state: format!("{:?}", entry.state).to_lowercase(),
                age_secs: entry.created_at.elapsed().as_secs(),
                idle_secs: entry.last_used.elapsed().as_secs(),
                use_count: entry.use_count,
                error_count: entry.error_count,
            })
            .collect()
    }

    /// Close every connection and refuse further acquisitions.
    pub fn shutdown(&self) {
        let handles: Vec<Arc<dyn EngineConnection>> = {
            let mut inner = self.lock();
            inner.shutdown = true;
            let ids: Vec<u64> = inner.entries.keys().copied().collect();
            ids.into_iter()
                .filter_map(|id| Self::close_entry(&mut inner, id))
                .collect()
        };
        for handle in handles {
            handle.close();
        }
        // Wake all blocked acquirers so they observe the shutdown.
        self.available.notify_waiters();
        info!("connection pool shut down");
    }
}
