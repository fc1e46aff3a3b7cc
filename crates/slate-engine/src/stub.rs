//! In-memory stub engine.
//!
//! Behaves like a real engine at the trait boundary: `execute` can be
//! made to block until `interrupt` is delivered from another thread,
//! and each failure point (connect, execute, probe, interrupt) can be
//! toggled at runtime. Used by tests across the workspace and for
//! running the service without a real engine binding.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::connection::{ConnectionFactory, EngineConnection, QueryOutput};
use crate::error::{EngineError, EngineResult};

/// Upper bound on how long a blocking stub execution waits for its
/// interrupt before giving up; keeps a buggy test from hanging forever.
const BLOCK_WAIT_LIMIT: Duration = Duration::from_secs(30);

/// Runtime-togglable behavior shared by a factory and its connections.
#[derive(Debug, Default)]
pub struct StubProfile {
    /// `connect` returns an error.
    pub fail_connect: AtomicBool,
    /// `execute` returns an execution error.
    pub fail_execute: AtomicBool,
    /// `probe` reports the connection as lost.
    pub fail_probe: AtomicBool,
    /// `interrupt` itself errors (the signal is not delivered).
    pub fail_interrupt: AtomicBool,
    /// `execute` blocks until `interrupt` (or `close`) is called.
    pub block_execute: AtomicBool,
}

/// Interrupt/close flags guarded by the execution condvar.
#[derive(Debug, Default)]
struct Signal {
    interrupted: bool,
    closed: bool,
}

/// An in-memory engine connection.
pub struct StubConnection {
    profile: Arc<StubProfile>,
    signal: Mutex<Signal>,
    cond: Condvar,
    executions: AtomicU64,
    interrupts: AtomicU64,
}

impl StubConnection {
    /// Create a connection with its own (default) profile.
    pub fn new() -> Self {
        Self::with_profile(Arc::new(StubProfile::default()))
    }

    /// Create a connection driven by a shared profile.
    pub fn with_profile(profile: Arc<StubProfile>) -> Self {
        Self {
            profile,
            signal: Mutex::new(Signal::default()),
            cond: Condvar::new(),
            executions: AtomicU64::new(0),
            interrupts: AtomicU64::new(0),
        }
    }

    /// The behavior profile driving this connection.
    pub fn profile(&self) -> &Arc<StubProfile> {
        &self.profile
    }

    /// How many `execute` calls completed or started blocking.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// How many interrupt signals were delivered.
    pub fn interrupts(&self) -> u64 {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn signal(&self) -> MutexGuard<'_, Signal> {
        // A poisoned stub lock only means a test thread panicked; the
        // flags inside are still coherent.
        self.signal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StubConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubConnection")
            .field("executions", &self.executions.load(Ordering::SeqCst))
            .field("interrupts", &self.interrupts.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl EngineConnection for StubConnection {
    fn execute(&self, sql: &str) -> EngineResult<QueryOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        {
            let signal = self.signal();
            if signal.closed {
                return Err(EngineError::ConnectionLost("connection closed".to_string()));
            }
        }
        if self.profile.fail_execute.load(Ordering::SeqCst) {
            return Err(EngineError::Execution(format!("stub execution failure: {sql}")));
        }

        if self.profile.block_execute.load(Ordering::SeqCst) {
            let mut signal = self.signal();
            while !signal.interrupted && !signal.closed {
                let (guard, wait) = self
                    .cond
                    .wait_timeout(signal, BLOCK_WAIT_LIMIT)
                    .unwrap_or_else(|e| e.into_inner());
                signal = guard;
                if wait.timed_out() {
                    return Err(EngineError::Execution(
                        "stub execution gave up waiting for interrupt".to_string(),
                    ));
                }
            }
            if signal.interrupted {
                signal.interrupted = false;
                return Err(EngineError::Interrupted);
            }
            return Err(EngineError::ConnectionLost("connection closed".to_string()));
        }

        Ok(QueryOutput {
            columns: vec!["result".to_string()],
            row_count: 1,
        })
    }

    fn interrupt(&self) -> EngineResult<()> {
        if self.profile.fail_interrupt.load(Ordering::SeqCst) {
            return Err(EngineError::Execution("stub interrupt failure".to_string()));
        }
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        let mut signal = self.signal();
        signal.interrupted = true;
        self.cond.notify_all();
        Ok(())
    }

    fn probe(&self) -> EngineResult<()> {
        if self.profile.fail_probe.load(Ordering::SeqCst) {
            return Err(EngineError::ConnectionLost("stub probe failure".to_string()));
        }
        let signal = self.signal();
        if signal.closed {
            return Err(EngineError::ConnectionLost("connection closed".to_string()));
        }
        Ok(())
    }

    fn close(&self) {
        let mut signal = self.signal();
        signal.closed = true;
        self.cond.notify_all();
    }
}

/// Factory producing stub connections that share one profile.
pub struct StubFactory {
    profile: Arc<StubProfile>,
    connects: AtomicU64,
}

impl StubFactory {
    pub fn new() -> Self {
        Self {
            profile: Arc::new(StubProfile::default()),
            connects: AtomicU64::new(0),
        }
    }

    /// The shared profile applied to every connection this factory opens.
    pub fn profile(&self) -> &Arc<StubProfile> {
        &self.profile
    }

    /// How many connections were opened.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for StubFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for StubFactory {
    fn connect(&self) -> EngineResult<Arc<dyn EngineConnection>> {
        if self.profile.fail_connect.load(Ordering::SeqCst) {
            return Err(EngineError::Connect("stub connect failure".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubConnection::with_profile(self.profile.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_returns_summary() {
        let conn = StubConnection::new();
        let output = conn.execute("SELECT 1").unwrap();
        assert_eq!(output.row_count, 1);
        assert_eq!(conn.executions(), 1);
    }

    #[test]
    fn scripted_execute_failure() {
        let conn = StubConnection::new();
        conn.profile().fail_execute.store(true, Ordering::SeqCst);
        let err = conn.execute("SELECT 1").unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
    }

    #[test]
    fn blocking_execute_observes_interrupt() {
        let conn = Arc::new(StubConnection::new());
        conn.profile().block_execute.store(true, Ordering::SeqCst);

        let worker = {
            let conn = conn.clone();
            std::thread::spawn(move || conn.execute("SELECT sleep(60)"))
        };

        // Give the worker a moment to enter the wait.
        std::thread::sleep(Duration::from_millis(20));
        conn.interrupt().unwrap();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(EngineError::Interrupted)));
        assert_eq!(conn.interrupts(), 1);
    }

    #[test]
    fn blocking_execute_unblocks_on_close() {
        let conn = Arc::new(StubConnection::new());
        conn.profile().block_execute.store(true, Ordering::SeqCst);

        let worker = {
            let conn = conn.clone();
            std::thread::spawn(move || conn.execute("SELECT sleep(60)"))
        };

        std::thread::sleep(Duration::from_millis(20));
        conn.close();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(EngineError::ConnectionLost(_))));
    }

    #[test]
    fn probe_after_close_reports_lost() {
        let conn = StubConnection::new();
        assert!(conn.probe().is_ok());
        conn.close();
        assert!(conn.probe().is_err());
    }

    #[test]
    fn factory_shares_profile_and_counts() {
        let factory = StubFactory::new();
        let c1 = factory.connect().unwrap();
        let _c2 = factory.connect().unwrap();
        assert_eq!(factory.connects(), 2);

        factory.profile().fail_execute.store(true, Ordering::SeqCst);
        assert!(c1.execute("SELECT 1").is_err());
    }

    #[test]
    fn factory_connect_failure() {
        let factory = StubFactory::new();
        factory.profile().fail_connect.store(true, Ordering::SeqCst);
        assert!(matches!(
            factory.connect().unwrap_err(),
            EngineError::Connect(_)
        ));
    }
}
