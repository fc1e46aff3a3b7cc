//! Task manager error types.

use thiserror::Error;

use slate_state::StoreError;

/// Errors that can occur during task manager operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task id is unknown. Reported to the caller, not fatal.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The task store failed (after retries, for the conflict class).
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TaskResult<T> = Result<T, TaskError>;
