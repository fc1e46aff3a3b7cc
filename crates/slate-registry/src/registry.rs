//! Active-query registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use slate_engine::{EngineConnection, EngineResult};

/// Longest SQL prefix kept for diagnostics.
const SQL_PREVIEW_LEN: usize = 120;

/// One registered in-flight query.
struct ConnectionRecord {
    /// Weak handle — the registry never owns or closes a connection.
    handle: Weak<dyn EngineConnection>,
    /// Identifier of the worker/context that registered the query.
    owner: String,
    registered_at: Instant,
    sql_preview: String,
}

/// Diagnostic snapshot of a registered query.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveQuery {
    pub query_id: String,
    pub owner: String,
    pub age: Duration,
    pub sql_preview: String,
}

/// Maps active query ids to the connections executing them.
///
/// All operations are serialized under a single lock; every operation is
/// O(1)-ish map access, never query execution, so the lock is held only
/// briefly. The engine `interrupt` call itself happens outside the lock.
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<String, ConnectionRecord>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionRecord>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a query as executing on `handle`.
    ///
    /// A duplicate id is not an error: the previous record is replaced
    /// (last writer wins) with a warning.
    pub fn register(&self, query_id: &str, handle: &Arc<dyn EngineConnection>, owner: &str, sql: &str) {
        let record = ConnectionRecord {
            handle: Arc::downgrade(handle),
            owner: owner.to_string(),
            registered_at: Instant::now(),
            sql_preview: sql.chars().take(SQL_PREVIEW_LEN).collect(),
        };
        let previous = self.lock().insert(query_id.to_string(), record);
        if previous.is_some() {
            warn!(%query_id, "query id re-registered, replacing previous entry");
        } else {
            debug!(%query_id, %owner, "query registered");
        }
    }

    /// Remove a query's record. Returns whether it existed.
    pub fn unregister(&self, query_id: &str) -> bool {
        let existed = self.lock().remove(query_id).is_some();
        if existed {
            debug!(%query_id, "query unregistered");
        }
        existed
    }

    /// Deliver an interrupt to the connection executing `query_id`.
    ///
    /// Returns `Ok(false)` if the id is not registered (already completed
    /// or never started — not an error) or the connection is already
    /// gone. A failure from the engine's interrupt call propagates.
    pub fn interrupt(&self, query_id: &str) -> EngineResult<bool> {
        let handle = match self.lock().get(query_id) {
            Some(record) => record.handle.clone(),
            None => return Ok(false),
        };
        match handle.upgrade() {
            Some(conn) => {
                conn.interrupt()?;
                info!(%query_id, "interrupt delivered");
                Ok(true)
            }
            None => {
                // The connection was dropped without unregistering.
                self.lock().remove(query_id);
                debug!(%query_id, "registered connection already gone, record dropped");
                Ok(false)
            }
        }
    }

    /// Remove entries older than `max_age`, skipping ids that end in
    /// `ignore_suffix` (protects short-lived bookkeeping queries).
    /// Returns the number removed.
    pub fn cleanup_stale(&self, max_age: Duration, ignore_suffix: Option<&str>) -> usize {
        let mut inner = self.lock();
        let before = inner.len();
        inner.retain(|query_id, record| {
            if let Some(suffix) = ignore_suffix {
                if query_id.ends_with(suffix) {
                    return true;
                }
            }
            record.registered_at.elapsed() < max_age
        });
        let removed = before - inner.len();
        drop(inner);
        if removed > 0 {
            warn!(removed, "purged stale query registrations");
        }
        removed
    }

    /// Number of currently registered queries.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Diagnostic view of all registered queries.
    pub fn snapshot(&self) -> Vec<ActiveQuery> {
        self.lock()
            .iter()
            .map(|(query_id, record)| ActiveQuery {
                query_id: query_id.clone(),
                owner: record.owner.clone(),
                age: record.registered_at.elapsed(),
                sql_preview: record.sql_preview.clone(),
            })
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
