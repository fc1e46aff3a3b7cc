//! Connection and factory traits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Summary of a completed query execution.
///
/// Result rows themselves are streamed/cached by outer layers; the core
/// only persists this summary alongside the task record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryOutput {
    /// Column names of the result set.
    pub columns: Vec<String>,
    /// Number of rows produced.
    pub row_count: u64,
}

/// An open session with the embedded analytical engine.
///
/// `execute` blocks the calling thread for the duration of the query.
/// `interrupt` may be called concurrently from any other thread; the
/// engine observes the signal cooperatively and aborts the in-flight
/// `execute` with [`crate::EngineError::Interrupted`].
pub trait EngineConnection: Send + Sync + std::fmt::Debug {
    /// Execute a SQL statement to completion.
    fn execute(&self, sql: &str) -> EngineResult<QueryOutput>;

    /// Signal the engine to abort the currently executing query.
    fn interrupt(&self) -> EngineResult<()>;

    /// Cheap liveness probe (a no-op query).
    fn probe(&self) -> EngineResult<()>;

    /// Close the connection. Idempotent.
    fn close(&self);
}

/// Opens new engine connections.
///
/// Implementations apply engine-specific session parameters (memory
/// limits, thread counts, extensions) once, before handing the
/// connection out.
pub trait ConnectionFactory: Send + Sync {
    /// Open a new configured connection.
    fn connect(&self) -> EngineResult<Arc<dyn EngineConnection>>;
}
