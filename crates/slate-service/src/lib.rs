//! slate-service — assembles the Slate core into one service.
//!
//! The [`ServiceContext`] is the explicit dependency-injection root:
//! constructed once at process start from a [`ServiceConfig`], an
//! engine [`slate_engine::ConnectionFactory`], and a
//! [`slate_state::TaskStore`], then passed by reference to every
//! consumer. There is no module-level global state; tests build a
//! fresh context each.
//!
//! It also implements the two execution paths around the pool and the
//! registry:
//!
//! - [`ServiceContext::execute_query`]: synchronous — acquire, register,
//!   execute on a blocking worker, unregister, release
//! - [`ServiceContext::submit`]: background — the same sequence wrapped
//!   in the task manager's persisted state transitions, with the
//!   engine's interrupted error converted into a cancellation

pub mod config;
pub mod context;
pub mod error;
pub mod execute;

pub use config::ServiceConfig;
pub use context::ServiceContext;
pub use error::ServiceError;
