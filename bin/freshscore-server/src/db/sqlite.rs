//! SQLite implementation of [`TaskStore`].
//!
//! Uses [`sqlx`] with the `sqlite` feature.  Migrations are run
//! automatically on startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path **at compile time**
//! relative to `CARGO_MANIFEST_DIR` (the crate root), so the directory is
//! embedded into the binary.  The database file location is determined at
//! runtime by `FRESHSCORE_DATABASE_URL` and is **not** related to the
//! current working directory.
//!
//! # Queries
//!
//! The `sqlx::query` (runtime-verified) form is used deliberately so that
//! no `DATABASE_URL` environment variable is needed at compile time.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{TaskRecord, TaskStatus, TaskStore};

/// SQLite-backed task store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending
    /// migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://freshscore.db?mode=rwc"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(url).await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

impl TaskStore for SqliteStore {
    async fn create_task(&self, task_id: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO tasks (task_id, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(task_id)
        .bind(TaskStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), sqlx::Error> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3")
            .bind(status.as_str())
            .bind(&updated_at)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: &str,
    ) -> Result<(), sqlx::Error> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE tasks SET status = ?1, result = ?2, updated_at = ?3 WHERE task_id = ?4",
        )
        .bind(status.as_str())
        .bind(result)
        .bind(&updated_at)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row: Option<(i64, String, String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT id, task_id, status, result, created_at, updated_at \
             FROM tasks WHERE task_id = ?1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, task_id, status, result, created_at, updated_at)| TaskRecord {
                id,
                task_id,
                status: status.parse().unwrap_or_else(|e: String| {
                    tracing::warn!(raw = %status, error = %e, "unrecognised task status; treating as failed");
                    TaskStatus::Failed
                }),
                result,
                created_at: parse_timestamp(&created_at),
                updated_at: parse_timestamp(&updated_at),
            },
        ))
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, error = %e, "failed to parse task timestamp; using now");
        Utc::now()
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    async fn temp_store(dir: &tempfile::TempDir) -> SqliteStore {
        let url = format!("sqlite://{}/tasks.db?mode=rwc", dir.path().display());
        SqliteStore::connect(&url).await.expect("store connects")
    }

    #[tokio::test]
    async fn create_then_get_returns_pending_with_no_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = temp_store(&dir).await;

        store.create_task("task-1").await.expect("create");
        let record = store
            .get_task("task-1")
            .await
            .expect("get")
            .expect("row exists");

        assert_eq!(record.task_id, "task-1");
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.result.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[tokio::test]
    async fn unknown_task_id_is_a_distinct_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = temp_store(&dir).await;

        let missing = store.get_task("no-such-task").await.expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn duplicate_task_id_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = temp_store(&dir).await;

        store.create_task("task-1").await.expect("first create");
        assert!(
            store.create_task("task-1").await.is_err(),
            "unique constraint should reject a duplicate task_id"
        );
    }

    #[tokio::test]
    async fn status_walks_forward_through_the_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = temp_store(&dir).await;
        store.create_task("task-1").await.expect("create");

        store
            .update_task_status("task-1", TaskStatus::Running)
            .await
            .expect("running");
        let running = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(running.status, TaskStatus::Running);
        assert!(running.result.is_none());

        store
            .update_task_result("task-1", TaskStatus::Success, r#"{"name":"banana"}"#)
            .await
            .expect("success");
        let done = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(done.status, TaskStatus::Success);
        assert_eq!(done.result.as_deref(), Some(r#"{"name":"banana"}"#));
    }

    #[tokio::test]
    async fn writes_refresh_updated_at_but_not_created_at() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = temp_store(&dir).await;
        store.create_task("task-1").await.expect("create");
        let before = store.get_task("task-1").await.expect("get").expect("row");

        tokio::time::sleep(Duration::from_millis(10)).await;
        store
            .update_task_status("task-1", TaskStatus::Failed)
            .await
            .expect("failed");

        let after = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn concurrent_creates_produce_disjoint_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = temp_store(&dir).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let task_id = format!("task-{i}");
                store.create_task(&task_id).await.expect("create");
                task_id
            }));
        }

        for handle in handles {
            let task_id = handle.await.expect("join");
            let record = store
                .get_task(&task_id)
                .await
                .expect("get")
                .expect("row exists");
            assert_eq!(record.task_id, task_id);
            assert_eq!(record.status, TaskStatus::Pending);
        }
    }
}
