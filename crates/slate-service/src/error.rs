//! Service-level error types.

use thiserror::Error;

use slate_engine::EngineError;
use slate_pool::PoolError;
use slate_tasks::TaskError;

/// Errors surfaced by the service execution paths.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The query was interrupted by a cancel request. Callers report
    /// this as a cancellation, not a failure.
    #[error("query interrupted")]
    Interrupted,

    /// Could not obtain a connection (exhausted, creation failed, or
    /// the pool is shut down).
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The engine failed executing the query.
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// A task manager operation failed.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The blocking execution worker died (panic or cancellation).
    #[error("execution worker failed: {0}")]
    Worker(String),
}
