//! Pool error types.

use std::time::Duration;

use thiserror::Error;

use slate_engine::EngineError;

/// Errors that can occur acquiring a connection from the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within the timeout. Retryable by
    /// the caller; the pool itself is healthy.
    #[error("pool exhausted: no connection available within {0:?}")]
    Exhausted(Duration),

    /// Opening a new connection failed (configuration or resource
    /// error). Not retried automatically.
    #[error("connection creation failed: {0}")]
    CreationFailed(#[source] EngineError),

    /// The pool has been shut down.
    #[error("pool is shut down")]
    Closed,
}

pub type PoolResult<T> = Result<T, PoolError>;
