//! Database abstraction layer.
//!
//! [`TaskStore`] defines the interface for persisting detection task rows.
//! The default implementation is [`sqlite::SqliteStore`].  To swap to
//! another database (Postgres, MySQL, …), implement [`TaskStore`] for your
//! new type and change the concrete type in [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures (stable since
//! Rust 1.75) so no extra `async-trait` crate is required.

pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};

/// Lifecycle states of a detection task.
///
/// Transitions only move forward: `Pending → Running → (Success | Failed)`.
/// The two terminal states are never left; a failed detection needs a fresh
/// submission with a new task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// A single row in the `tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Internal row id; never exposed through the API.
    pub id: i64,
    /// Externally visible task identifier (UUID), immutable after creation.
    pub task_id: String,
    pub status: TaskStatus,
    /// Raw model output; present only once the task has succeeded.
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every status or result write.
    pub updated_at: DateTime<Utc>,
}

/// Trait for persisting detection task rows.
///
/// Only the orchestrator owning a task's lifecycle writes to its row, so no
/// store implementation needs compare-and-swap semantics: plain sequential
/// UPDATEs keep the per-task transition order intact.
pub trait TaskStore: Send + Sync + 'static {
    /// Insert a fresh row with status `pending` and both timestamps set.
    fn create_task(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Status-only transition write; refreshes `updated_at`.
    fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Write status and raw result in a single UPDATE (the success
    /// transition); refreshes `updated_at`.
    fn update_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Snapshot of the row; `None` is the distinct not-found condition.
    fn get_task(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<TaskRecord>, sqlx::Error>> + Send;
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::TaskStatus;

    #[test]
    fn status_string_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
        ] {
            let parsed: TaskStatus = status.as_str().parse().expect("round trip");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }
}
