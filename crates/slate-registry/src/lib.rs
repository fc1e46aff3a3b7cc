//! slate-registry — maps in-flight query ids to the engine connection
//! executing them.
//!
//! Any execution context can look up a query by id and deliver an
//! interrupt to a connection it does not itself hold. The registry only
//! keeps weak references: it never keeps a connection alive and never
//! closes one. Entries left behind by workers that died without
//! unregistering are reclaimed by the watchdog's staleness sweep.

pub mod registry;

pub use registry::{ActiveQuery, ConnectionRegistry};
