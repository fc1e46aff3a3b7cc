//! Domain types for the Slate task store.
//!
//! These types represent the persisted state of background query tasks.
//! All types are serializable to/from JSON for storage in redb tables.
//! Timestamps are epoch milliseconds.

use serde::{Deserialize, Serialize};

use slate_engine::QueryOutput;

/// Unique identifier for a background task.
pub type TaskId = String;

/// Lifecycle status of a background task.
///
/// Transitions are enforced centrally by the task manager's transition
/// table; the store itself accepts any record it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelling,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are immutable except for metadata fields.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// Persisted record of a background query task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// The SQL text being executed.
    pub query: String,
    /// Epoch ms when the task was submitted.
    pub created_at: u64,
    /// Epoch ms when execution started.
    pub started_at: Option<u64>,
    /// Epoch ms when the task reached a terminal state.
    pub completed_at: Option<u64>,
    /// Epoch ms when cancellation was requested (drives the watchdog's
    /// stuck-cancelling sweep).
    pub cancel_requested_at: Option<u64>,
    /// Result summary, present on Success.
    pub result_info: Option<QueryOutput>,
    /// Failure message, present on Failed.
    pub error_message: Option<String>,
    /// Caller-supplied cancellation reason.
    pub cancel_reason: Option<String>,
    /// Wall-clock execution time, from start to terminal state.
    pub execution_time_ms: Option<u64>,
}

impl TaskRecord {
    /// A freshly submitted task in the Queued state.
    pub fn new(task_id: &str, query: &str, now_ms: u64) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Queued,
            query: query.to_string(),
            created_at: now_ms,
            started_at: None,
            completed_at: None,
            cancel_requested_at: None,
            result_info: None,
            error_message: None,
            cancel_reason: None,
            execution_time_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Cancelling.is_terminal());
    }

    #[test]
    fn new_record_is_queued() {
        let record = TaskRecord::new("task-1", "SELECT 1", 1000);
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.created_at, 1000);
        assert!(record.started_at.is_none());
        assert!(record.result_info.is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Cancelling).unwrap();
        assert_eq!(json, "\"cancelling\"");
    }
}
