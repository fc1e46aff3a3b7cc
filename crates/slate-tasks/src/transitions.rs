//! The task state machine, in one place.
//!
//! Every manager operation maps to an event; `next_status` is the only
//! authority on which `(status, event)` pairs are legal. An illegal
//! pair is a no-op at the call site, never a panic.

use slate_state::TaskStatus;

/// Events that drive task status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// Execution began.
    Start,
    /// Execution finished successfully.
    Complete,
    /// Execution finished with an error.
    Fail,
    /// A caller asked for cancellation.
    RequestCancel,
    /// The execution path observed the engine's interrupted error.
    MarkCancelled,
    /// Administrative override; legal from any non-terminal state.
    ForceFail,
}

/// The transition table. Returns the next status, or `None` if the
/// event is not legal from `current`.
///
/// Cancellation takes precedence over late completion: once a task is
/// Cancelling, `Complete` and `Fail` are rejected.
pub fn next_status(current: TaskStatus, event: TaskEvent) -> Option<TaskStatus> {
    use TaskEvent::*;
    use TaskStatus::*;
    match (current, event) {
        (Queued, Start) => Some(Running),
        (Running, Complete) => Some(Success),
        (Running, Fail) => Some(Failed),
        (Queued | Running, RequestCancel) => Some(Cancelling),
        (Cancelling, MarkCancelled) => Some(Cancelled),
        (status, ForceFail) if !status.is_terminal() => Some(Failed),
        _ => None,
    }
}
