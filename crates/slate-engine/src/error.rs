//! Engine error taxonomy.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by an engine connection.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine observed an interrupt signal during execution.
    ///
    /// This is the cooperative-cancellation path: callers match on this
    /// kind and record a cancellation rather than a failure.
    #[error("query interrupted")]
    Interrupted,

    /// SQL execution failed (syntax error, runtime error, OOM, ...).
    #[error("execution error: {0}")]
    Execution(String),

    /// Opening or configuring a new connection failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// The underlying connection is no longer usable.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl EngineError {
    /// Whether this error is the distinguished interrupt kind.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_is_distinguishable() {
        assert!(EngineError::Interrupted.is_interrupted());
        assert!(!EngineError::Execution("boom".to_string()).is_interrupted());
        assert!(!EngineError::ConnectionLost("gone".to_string()).is_interrupted());
    }
}
