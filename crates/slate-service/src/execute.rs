//! Query execution paths.
//!
//! Both paths follow the same sequence: acquire a pooled connection,
//! register it under the query id so any caller can interrupt it, run
//! the query on a blocking worker, unregister, then release the
//! connection (or quarantine it on engine failure). The background
//! path additionally drives the task state machine and converts the
//! engine's interrupted error into a cancellation.

use std::sync::Arc;

use tracing::{debug, warn};

use slate_engine::QueryOutput;
use slate_state::TaskStatus;
use slate_tasks::task_query_id;

use crate::context::ServiceContext;
use crate::error::ServiceError;

impl ServiceContext {
    /// Execute a query synchronously under the caller's query id.
    ///
    /// The id is live in the registry for the duration of the call, so
    /// another thread can `interrupt` it; that surfaces here as
    /// [`ServiceError::Interrupted`].
    pub async fn execute_query(&self, query_id: &str, sql: &str) -> Result<QueryOutput, ServiceError> {
        self.execute_registered(query_id, sql, "sync").await
    }

    async fn execute_registered(
        &self,
        query_id: &str,
        sql: &str,
        owner: &str,
    ) -> Result<QueryOutput, ServiceError> {
        let lease = self.pool().acquire().await?;
        self.registry().register(query_id, lease.connection(), owner, sql);

        let handle = lease.connection().clone();
        let sql_owned = sql.to_string();
        let joined = tokio::task::spawn_blocking(move || handle.execute(&sql_owned)).await;

        // Unregister before settling the lease: the query is no longer
        // interruptible either way.
        self.registry().unregister(query_id);

        match joined {
            Ok(Ok(output)) => {
                self.pool().release(lease);
                Ok(output)
            }
            Ok(Err(e)) if e.is_interrupted() => {
                // An interrupt aborts the statement, not the connection.
                self.pool().release(lease);
                Err(ServiceError::Interrupted)
            }
            Ok(Err(e)) => {
                self.pool().mark_error(lease, &e.to_string());
                Err(ServiceError::Engine(e))
            }
            Err(join_err) => {
                self.pool().mark_error(lease, "execution worker panicked");
                Err(ServiceError::Worker(join_err.to_string()))
            }
        }
    }

    /// Submit a query as a background task. Returns the task id
    /// immediately; execution runs on a spawned worker.
    pub async fn submit(self: &Arc<Self>, sql: &str) -> Result<String, ServiceError> {
        let task_id = self.manager().create(sql).await?;
        let ctx = Arc::clone(self);
        let spawned_id = task_id.clone();
        tokio::spawn(async move {
            ctx.run_task(&spawned_id).await;
        });
        Ok(task_id)
    }

    /// Drive one background task to a terminal state.
    ///
    /// Outcome mapping: success → `complete`, interrupted → `mark_cancelled`,
    /// anything else → `fail`. All terminal bookkeeping failures are
    /// logged; the worker itself never propagates.
    pub async fn run_task(&self, task_id: &str) {
        let started = match self.manager().start(task_id).await {
            Ok(started) => started,
            Err(e) => {
                warn!(%task_id, error = %e, "failed to start task");
                return;
            }
        };
        if !started {
            // Cancelled while still queued: nothing ran, settle directly.
            match self.manager().get(task_id) {
                Ok(Some(record)) if record.status == TaskStatus::Cancelling => {
                    if let Err(e) = self.manager().mark_cancelled(task_id).await {
                        warn!(%task_id, error = %e, "failed to settle pre-start cancellation");
                    }
                }
                _ => debug!(%task_id, "task not started"),
            }
            return;
        }

        let query = match self.manager().get(task_id) {
            Ok(Some(record)) => record.query,
            Ok(None) => {
                warn!(%task_id, "task record vanished after start");
                return;
            }
            Err(e) => {
                warn!(%task_id, error = %e, "failed to load task record");
                return;
            }
        };

        let outcome = self
            .execute_registered(&task_query_id(task_id), &query, "task-worker")
            .await;
        let settled = match outcome {
            Ok(output) => self.manager().complete(task_id, output).await,
            Err(ServiceError::Interrupted) => self.manager().mark_cancelled(task_id).await,
            Err(e) => self.manager().fail(task_id, &e.to_string()).await,
        };
        if let Err(e) = settled {
            warn!(%task_id, error = %e, "failed to record task outcome");
        }
    }

    /// Request cancellation of a background task.
    ///
    /// Returns false for unknown-or-terminal tasks ("not found / already
    /// completed") rather than erroring.
    pub async fn cancel(&self, task_id: &str, reason: &str) -> Result<bool, ServiceError> {
        match self.manager().request_cancel(task_id, reason).await {
            Ok(changed) => Ok(changed),
            Err(slate_tasks::TaskError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
