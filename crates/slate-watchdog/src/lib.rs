//! slate-watchdog — periodic background recovery sweep.
//!
//! Cancellation is cooperative, so signals can get lost: an interrupt
//! may never reach the engine, or a worker may die without
//! unregistering its query. The watchdog runs on a fixed interval and
//! reclaims both kinds of debris: tasks stuck in Cancelling are
//! force-failed with a synthetic timeout message, stale registry
//! entries are purged, and long-dead terminal tasks are expired from
//! the store. Every sweep is best-effort — failures are logged and the
//! loop continues.

pub mod watchdog;

pub use watchdog::{Watchdog, WatchdogConfig, WatchdogHandle};
