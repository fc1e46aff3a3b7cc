//! slate-pool — bounded pool of engine connections.
//!
//! Hands out exclusive, validated connections to the embedded engine,
//! bounds the total number of concurrent connections, and self-heals:
//! connections that report errors are quarantined, probed, and either
//! returned to service or closed. A background maintenance loop closes
//! idle connections past their timeout (never shrinking below the
//! configured minimum) and retries quarantined ones.
//!
//! Acquisition at capacity waits on a notification with a timeout.
//! There is no FIFO fairness among waiters: whichever woken (or barging)
//! caller scans first wins the freed slot.

pub mod error;
pub mod maintenance;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use maintenance::MaintenanceHandle;
pub use pool::{ConnState, ConnectionLease, ConnectionPool, PoolConfig, PoolStats};
