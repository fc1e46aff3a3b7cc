//! slate-state — persisted task store for Slate.
//!
//! Backed by [redb](https://docs.rs/redb), holds the durable record of
//! every submitted background task so task state survives process
//! restarts. The in-memory view held by the task manager is a cache of
//! this store.
//!
//! # Architecture
//!
//! Task records are JSON-serialized into redb's `&[u8]` value column,
//! keyed by task id. The store is shared across possibly many processes;
//! commit-level failures are surfaced as [`StoreError::Conflict`] so the
//! task manager's retry helper can absorb transient contention.
//!
//! The [`RedbTaskStore`] is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks. The
//! [`TaskStore`] trait is the seam consumers depend on; tests substitute
//! in-memory or fault-injecting implementations.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::{RedbTaskStore, TaskStore};
pub use types::*;
