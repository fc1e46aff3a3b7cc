//! Retry helper for task store writes.
//!
//! The task store is shared with writers in other processes, so a write
//! can lose a commit race. Only that conflict class is retried; any
//! other error propagates immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use slate_state::StoreResult;

/// Backoff parameters for conflicted store writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles each attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(20)))
    }
}

/// Run a store write, absorbing transient conflicts with exponential
/// backoff. Exhausting the retries re-raises the last conflict.
pub async fn with_write_retry<T, F>(policy: &RetryPolicy, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> StoreResult<T>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e,
                    "task store write conflict, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
