//! TaskStore — redb-backed task persistence for Slate.
//!
//! Typed CRUD over task records, JSON-serialized into redb's `&[u8]`
//! value column. Supports on-disk and in-memory backends (the latter
//! for testing). Commit failures map to [`StoreError::Conflict`], the
//! class the task manager retries with backoff.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::TASKS;
use crate::types::{TaskRecord, TaskStatus};

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// The persistence seam the task manager depends on.
///
/// Object-safe so tests can substitute fault-injecting implementations.
pub trait TaskStore: Send + Sync {
    /// Insert or update a task record.
    fn upsert(&self, task: &TaskRecord) -> StoreResult<()>;

    /// Get a task record by id.
    fn get(&self, task_id: &str) -> StoreResult<Option<TaskRecord>>;

    /// List task records, newest first, up to `limit`.
    fn list(&self, limit: usize) -> StoreResult<Vec<TaskRecord>>;

    /// Tasks sitting in Cancelling since before `cutoff_ms`.
    fn list_cancelling_older_than(&self, cutoff_ms: u64) -> StoreResult<Vec<TaskRecord>>;

    /// Delete terminal tasks completed before `before_ms`. Returns the
    /// number deleted.
    fn delete_expired(&self, before_ms: u64) -> StoreResult<u32>;
}

/// Thread-safe task store backed by redb.
#[derive(Clone)]
pub struct RedbTaskStore {
    db: Arc<Database>,
}

impl RedbTaskStore {
    /// Open (or create) a persistent task store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "task store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory task store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory task store opened");
        Ok(store)
    }

    /// Create the tasks table if it doesn't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn scan<F>(&self, mut keep: F) -> StoreResult<Vec<TaskRecord>>
    where
        F: FnMut(&TaskRecord) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: TaskRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }
}

impl TaskStore for RedbTaskStore {
    fn upsert(&self, task: &TaskRecord) -> StoreResult<()> {
        let value = serde_json::to_vec(task).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            table
                .insert(task.task_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        // Losing the commit (e.g. the file lock went to another process's
        // writer) is the transient class callers retry.
        txn.commit().map_err(map_err!(Conflict))?;
        debug!(task_id = %task.task_id, status = ?task.status, "task stored");
        Ok(())
    }

    fn get(&self, task_id: &str) -> StoreResult<Option<TaskRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        match table.get(task_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: TaskRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list(&self, limit: usize) -> StoreResult<Vec<TaskRecord>> {
        let mut results = self.scan(|_| true)?;
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(limit);
        Ok(results)
    }

    fn list_cancelling_older_than(&self, cutoff_ms: u64) -> StoreResult<Vec<TaskRecord>> {
        self.scan(|record| {
            record.status == TaskStatus::Cancelling
                && record
                    .cancel_requested_at
                    .or(record.started_at)
                    .unwrap_or(record.created_at)
                    < cutoff_ms
        })
    }

    fn delete_expired(&self, before_ms: u64) -> StoreResult<u32> {
        // Collect keys in a read transaction first.
        let expired: Vec<String> = self
            .scan(|record| {
                record.status.is_terminal() && record.completed_at.unwrap_or(record.created_at) < before_ms
            })?
            .into_iter()
            .map(|record| record.task_id)
            .collect();

        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = expired.len() as u32;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            for task_id in &expired {
                table.remove(task_id.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Conflict))?;
        if count > 0 {
            debug!(count, "expired tasks deleted");
        }
        Ok(count)
    }
}
