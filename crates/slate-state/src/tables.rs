//! redb table definitions for the Slate task store.
//!
//! The table uses `&str` keys and `&[u8]` values (JSON-serialized task
//! records), keyed by task id.

use redb::TableDefinition;

/// Task records keyed by `{task_id}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
