//! Error types for the Slate task store.

use thiserror::Error;

/// Result type alias for task store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during task store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// Transient write contention (another writer won the commit).
    /// The only class the task manager retries.
    #[error("write conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether this error is the transient, retryable conflict class.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
