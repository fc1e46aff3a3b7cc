//! The task manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use slate_engine::QueryOutput;
use slate_registry::ConnectionRegistry;
use slate_state::{TaskRecord, TaskStore};

use crate::error::{TaskError, TaskResult};
use crate::retry::{with_write_retry, RetryPolicy};
use crate::transitions::{next_status, TaskEvent};

/// Registry id for a task's query.
///
/// Namespaced so synchronous queries (registered under caller-chosen
/// ids) and background tasks share one registry without colliding.
pub fn task_query_id(task_id: &str) -> String {
    format!("task:{task_id}")
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Tracks background query tasks through their persisted state machine.
///
/// All transitions re-read the current status under the write lock and
/// consult the central transition table; a rejected transition is a
/// logged no-op, not an error. Terminal states are never overwritten.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    registry: Arc<ConnectionRegistry>,
    retry: RetryPolicy,
    /// Serializes read-modify-write cycles on task records within this
    /// process; cross-process contention is handled by the retry helper.
    write_lock: Mutex<()>,
    seq: AtomicU64,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<ConnectionRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            retry,
            write_lock: Mutex::new(()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Submit a new task in the Queued state. Returns its id.
    pub async fn create(&self, query: &str) -> TaskResult<String> {
        let now = epoch_ms();
        let task_id = format!("task-{}-{}", now, self.seq.fetch_add(1, Ordering::Relaxed));
        let record = TaskRecord::new(&task_id, query, now);

        let _guard = self.write_lock.lock().await;
        self.persist(&record).await?;
        info!(%task_id, "task created");
        Ok(task_id)
    }

    /// Queued → Running. Records the start time.
    pub async fn start(&self, task_id: &str) -> TaskResult<bool> {
        self.transition(task_id, TaskEvent::Start, |record| {
            record.started_at = Some(epoch_ms());
        })
        .await
    }

    /// Running → Success. Stores the result summary and unregisters the
    /// task's connection. A no-op if the task was cancelled meanwhile.
    pub async fn complete(&self, task_id: &str, output: QueryOutput) -> TaskResult<bool> {
        let changed = self
            .transition(task_id, TaskEvent::Complete, |record| {
                finish(record, epoch_ms());
                record.result_info = Some(output);
            })
            .await?;
        if changed {
            self.registry.unregister(&task_query_id(task_id));
        }
        Ok(changed)
    }

    /// Running → Failed with an error message.
    pub async fn fail(&self, task_id: &str, message: &str) -> TaskResult<bool> {
        let changed = self
            .transition(task_id, TaskEvent::Fail, |record| {
                finish(record, epoch_ms());
                record.error_message = Some(message.to_string());
            })
            .await?;
        if changed {
            self.registry.unregister(&task_query_id(task_id));
        }
        Ok(changed)
    }

    /// Queued/Running → Cancelling, then deliver the interrupt.
    ///
    /// The Cancelling state is persisted before the interrupt is sent;
    /// a missing registry entry or a failed interrupt call does not
    /// fail the request — the watchdog reclaims tasks whose interrupt
    /// never lands.
    pub async fn request_cancel(&self, task_id: &str, reason: &str) -> TaskResult<bool> {
        let changed = self
            .transition(task_id, TaskEvent::RequestCancel, |record| {
                record.cancel_reason = Some(reason.to_string());
                record.cancel_requested_at = Some(epoch_ms());
            })
            .await?;
        if !changed {
            return Ok(false);
        }
        match self.registry.interrupt(&task_query_id(task_id)) {
            Ok(true) => debug!(%task_id, "cancel requested, interrupt delivered"),
            Ok(false) => debug!(%task_id, "cancel requested, no connection registered yet"),
            Err(e) => warn!(%task_id, error = %e, "interrupt call failed; watchdog will reclaim"),
        }
        Ok(true)
    }

    /// Cancelling → Cancelled, after the execution path observed the
    /// engine's interrupted error.
    pub async fn mark_cancelled(&self, task_id: &str) -> TaskResult<bool> {
        let changed = self
            .transition(task_id, TaskEvent::MarkCancelled, |record| {
                finish(record, epoch_ms());
            })
            .await?;
        if changed {
            self.registry.unregister(&task_query_id(task_id));
        }
        Ok(changed)
    }

    /// Administrative override: any non-terminal state → Failed.
    ///
    /// Idempotent under races: a task that is already terminal is left
    /// untouched and reported as success.
    pub async fn force_fail(&self, task_id: &str, message: &str) -> TaskResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .store
            .get(task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if record.status.is_terminal() {
            debug!(%task_id, status = ?record.status, "force-fail on terminal task is a no-op");
            return Ok(true);
        }
        // The table admits ForceFail from every non-terminal state.
        let Some(next) = next_status(record.status, TaskEvent::ForceFail) else {
            return Ok(false);
        };
        record.status = next;
        finish(&mut record, epoch_ms());
        record.error_message = Some(message.to_string());
        self.persist(&record).await?;
        warn!(%task_id, %message, "task force-failed");
        drop(_guard);
        self.registry.unregister(&task_query_id(task_id));
        Ok(true)
    }

    /// Fetch a task record.
    pub fn get(&self, task_id: &str) -> TaskResult<Option<TaskRecord>> {
        Ok(self.store.get(task_id)?)
    }

    /// List task records, newest first.
    pub fn list(&self, limit: usize) -> TaskResult<Vec<TaskRecord>> {
        Ok(self.store.list(limit)?)
    }

    /// Force-fail every task stuck in Cancelling longer than `max_age`.
    /// Returns how many were reclaimed. Used by the watchdog.
    pub async fn sweep_stuck_cancelling(&self, max_age: Duration) -> TaskResult<u32> {
        let cutoff = epoch_ms().saturating_sub(max_age.as_millis() as u64);
        let stuck = self.store.list_cancelling_older_than(cutoff)?;
        let mut reclaimed = 0;
        for record in stuck {
            match self
                .force_fail(
                    &record.task_id,
                    "cancellation timed out waiting for the engine to acknowledge the interrupt",
                )
                .await
            {
                Ok(true) => {
                    reclaimed += 1;
                    warn!(task_id = %record.task_id, "reclaimed task stuck in cancelling");
                }
                Ok(false) => {}
                Err(e) => warn!(task_id = %record.task_id, error = %e, "failed to reclaim stuck task"),
            }
        }
        Ok(reclaimed)
    }

    /// Delete terminal tasks older than `retention`. Returns the count.
    pub async fn purge_expired(&self, retention: Duration) -> TaskResult<u32> {
        let before = epoch_ms().saturating_sub(retention.as_millis() as u64);
        let _guard = self.write_lock.lock().await;
        let deleted =
            with_write_retry(&self.retry, || self.store.delete_expired(before)).await?;
        Ok(deleted)
    }

    /// Guarded read-modify-write: re-read the record, consult the
    /// transition table, apply, persist.
    async fn transition<F>(&self, task_id: &str, event: TaskEvent, apply: F) -> TaskResult<bool>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .store
            .get(task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        let Some(next) = next_status(record.status, event) else {
            warn!(%task_id, from = ?record.status, event = ?event, "transition rejected");
            return Ok(false);
        };
        record.status = next;
        apply(&mut record);
        self.persist(&record).await?;
        debug!(%task_id, status = ?next, "task transitioned");
        Ok(true)
    }

    async fn persist(&self, record: &TaskRecord) -> TaskResult<()> {
        with_write_retry(&self.retry, || self.store.upsert(record)).await?;
        Ok(())
    }
}

/// Stamp a record as finished: completion time plus elapsed execution
/// time when a start time is known.
fn finish(record: &mut TaskRecord, now: u64) {
    record.completed_at = Some(now);
    record.execution_time_ms = record.started_at.map(|started| now.saturating_sub(started));
}
