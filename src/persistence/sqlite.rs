//! SQLite implementation of [`Store`]
//!
//! Embedded relational persistence using sqlx with:
//! - WAL journaling and a busy timeout for concurrent workers
//! - Idempotent schema bootstrap on connect
//! - Single-statement `UPDATE ... WHERE id = (SELECT ... LIMIT 1)
//!   RETURNING *` claims so two workers never observe the same task
//! - A partial unique index backing the one-active-workflow invariant

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::store::*;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        input TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_workflows_active
        ON workflows (name, input) WHERE status = 'RUNNING'",
    "CREATE INDEX IF NOT EXISTS idx_workflows_lookup
        ON workflows (name, input, status)",
    "CREATE TABLE IF NOT EXISTS activity_results (
        id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL,
        name TEXT NOT NULL,
        input TEXT NOT NULL,
        output TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_activity_results_lookup
        ON activity_results (workflow_id, name)",
    "CREATE TABLE IF NOT EXISTS signals (
        id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL,
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        step INTEGER,
        created_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_signals_bound
        ON signals (workflow_id, name, step) WHERE step IS NOT NULL",
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        retry_count INTEGER NOT NULL,
        input TEXT NOT NULL,
        queue_id TEXT NOT NULL,
        status TEXT NOT NULL,
        workflow_id TEXT,
        claimed_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_ready
        ON tasks (queue_id, status, timestamp)",
    "CREATE TABLE IF NOT EXISTS task_results (
        id TEXT PRIMARY KEY,
        result TEXT,
        error TEXT
    )",
];

/// SQLite implementation of [`Store`]
///
/// # Example
///
/// ```ignore
/// use lightemporal::SqliteStore;
///
/// let store = SqliteStore::connect("lightemporal.db").await?;
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database file, creating it and its schema when missing
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open the default `./lightemporal.db` database
    pub async fn connect_default() -> Result<Self, StoreError> {
        Self::connect("lightemporal.db").await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {ms}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn workflow_from_row(row: &SqliteRow) -> Result<WorkflowRecord, StoreError> {
    Ok(WorkflowRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        input: row.get("input"),
        status: WorkflowStatus::parse(&row.get::<String, _>("status"))?,
    })
}

fn activity_from_row(row: &SqliteRow) -> Result<ActivityRecord, StoreError> {
    Ok(ActivityRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        workflow_id: parse_uuid(&row.get::<String, _>("workflow_id"))?,
        name: row.get("name"),
        input: row.get("input"),
        output: row.get("output"),
    })
}

fn signal_from_row(row: &SqliteRow) -> Result<SignalRecord, StoreError> {
    Ok(SignalRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        workflow_id: parse_uuid(&row.get::<String, _>("workflow_id"))?,
        name: row.get("name"),
        content: row.get("content"),
        step: row.get::<Option<i64>, _>("step").map(|s| s as u32),
        created_at: from_millis(row.get("created_at"))?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
    let workflow_id = row
        .get::<Option<String>, _>("workflow_id")
        .map(|raw| parse_uuid(&raw))
        .transpose()?;
    let claimed_at = row
        .get::<Option<i64>, _>("claimed_at")
        .map(from_millis)
        .transpose()?;

    Ok(TaskRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        timestamp: from_millis(row.get("timestamp"))?,
        retry_count: row.get::<i64, _>("retry_count") as u32,
        input: row.get("input"),
        queue_id: row.get("queue_id"),
        status: TaskStatus::parse(&row.get::<String, _>("status"))?,
        workflow_id,
        claimed_at,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<TaskResultRecord, StoreError> {
    Ok(TaskResultRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        result: row.get("result"),
        error: row.get("error"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn workflow_get(&self, id: Uuid) -> Result<Option<WorkflowRecord>, StoreError> {
        sqlx::query("SELECT id, name, input, status FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(|row| workflow_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self, input))]
    async fn workflow_get_or_create(
        &self,
        name: &str,
        input: &str,
    ) -> Result<WorkflowRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let running = sqlx::query(
            "SELECT id FROM workflows WHERE name = ? AND input = ? AND status = 'RUNNING' LIMIT 1",
        )
        .bind(name)
        .bind(input)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if running.is_some() {
            return Err(StoreError::AlreadyRunning {
                name: name.to_string(),
            });
        }

        let revived = sqlx::query(
            "UPDATE workflows SET status = 'RUNNING'
             WHERE id = (
                 SELECT id FROM workflows
                 WHERE name = ? AND input = ? AND status = 'STOPPED'
                 LIMIT 1
             )
             RETURNING id, name, input, status",
        )
        .bind(name)
        .bind(input)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = revived {
            let workflow = workflow_from_row(&row)?;
            tx.commit().await.map_err(db_err)?;
            debug!(workflow_id = %workflow.id, %name, "revived stopped workflow");
            return Ok(workflow);
        }

        let workflow = WorkflowRecord::new(name, input);
        let inserted = sqlx::query(
            "INSERT INTO workflows (id, name, input, status) VALUES (?, ?, ?, ?)",
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.input)
        .bind(workflow.status.as_str())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await.map_err(db_err)?;
                debug!(workflow_id = %workflow.id, %name, "created workflow");
                Ok(workflow)
            }
            // A racing creator beat us to the active slot
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyRunning {
                name: name.to_string(),
            }),
            Err(err) => Err(db_err(err)),
        }
    }

    async fn workflow_set_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
    ) -> Result<WorkflowRecord, StoreError> {
        sqlx::query(
            "UPDATE workflows SET status = ? WHERE id = ? RETURNING id, name, input, status",
        )
        .bind(status.as_str())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::WorkflowNotFound(id))
        .and_then(|row| workflow_from_row(&row))
    }

    async fn activity_find(
        &self,
        workflow_id: Uuid,
        name: &str,
        input: &str,
    ) -> Result<Option<ActivityRecord>, StoreError> {
        sqlx::query(
            "SELECT id, workflow_id, name, input, output FROM activity_results
             WHERE workflow_id = ? AND name = ? AND input = ?
             LIMIT 1",
        )
        .bind(workflow_id.to_string())
        .bind(name)
        .bind(input)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(|row| activity_from_row(&row))
        .transpose()
    }

    async fn activity_save(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO activity_results (id, workflow_id, name, input, output)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET output = excluded.output",
        )
        .bind(record.id.to_string())
        .bind(record.workflow_id.to_string())
        .bind(&record.name)
        .bind(&record.input)
        .bind(&record.output)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn signal_insert(&self, record: &SignalRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO signals (id, workflow_id, name, content, step, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.workflow_id.to_string())
        .bind(&record.name)
        .bind(&record.content)
        .bind(record.step.map(|s| s as i64))
        .bind(millis(record.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn signal_take(
        &self,
        workflow_id: Uuid,
        name: &str,
        step: u32,
    ) -> Result<Option<SignalRecord>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let bound = sqlx::query(
            "SELECT id, workflow_id, name, content, step, created_at FROM signals
             WHERE workflow_id = ? AND name = ? AND step = ?",
        )
        .bind(workflow_id.to_string())
        .bind(name)
        .bind(step as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = bound {
            return Ok(Some(signal_from_row(&row)?));
        }

        let taken = sqlx::query(
            "UPDATE signals SET step = ?
             WHERE id = (
                 SELECT id FROM signals
                 WHERE workflow_id = ? AND name = ? AND step IS NULL
                 ORDER BY created_at, id
                 LIMIT 1
             )
             RETURNING id, workflow_id, name, content, step, created_at",
        )
        .bind(step as i64)
        .bind(workflow_id.to_string())
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match taken {
            Some(row) => {
                let signal = signal_from_row(&row)?;
                tx.commit().await.map_err(db_err)?;
                debug!(%workflow_id, signal = name, step, "bound signal");
                Ok(Some(signal))
            }
            None => Ok(None),
        }
    }

    async fn task_upsert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks
                 (id, name, timestamp, retry_count, input, queue_id, status, workflow_id, claimed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 timestamp = excluded.timestamp,
                 retry_count = excluded.retry_count,
                 status = excluded.status,
                 claimed_at = excluded.claimed_at",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(millis(record.timestamp))
        .bind(record.retry_count as i64)
        .bind(&record.input)
        .bind(&record.queue_id)
        .bind(record.status.as_str())
        .bind(record.workflow_id.map(|id| id.to_string()))
        .bind(record.claimed_at.map(millis))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn task_get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        sqlx::query(
            "SELECT id, name, timestamp, retry_count, input, queue_id, status, workflow_id, claimed_at
             FROM tasks WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(|row| task_from_row(&row))
        .transpose()
    }

    #[instrument(skip(self, now))]
    async fn task_claim_next(
        &self,
        queue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let claimed = sqlx::query(
            "UPDATE tasks SET status = 'RUNNING', claimed_at = ?
             WHERE id = (
                 SELECT id FROM tasks
                 WHERE queue_id = ? AND status = 'SCHEDULED' AND timestamp <= ?
                 ORDER BY timestamp, id
                 LIMIT 1
             )
             RETURNING id, name, timestamp, retry_count, input, queue_id, status, workflow_id, claimed_at",
        )
        .bind(millis(now))
        .bind(queue_id)
        .bind(millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match claimed {
            Some(row) => {
                let task = task_from_row(&row)?;
                debug!(task_id = %task.id, task = %task.name, "claimed task");
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn task_suspend(&self, id: Uuid) -> Result<bool, StoreError> {
        let done = sqlx::query(
            "UPDATE tasks SET status = 'SUSPENDED'
             WHERE id = ? AND status IN ('SCHEDULED', 'RUNNING')",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected() > 0)
    }

    async fn task_wakeup(&self, id: Uuid) -> Result<bool, StoreError> {
        let done = sqlx::query(
            "UPDATE tasks SET status = 'SCHEDULED' WHERE id = ? AND status = 'SUSPENDED'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected() > 0)
    }

    async fn task_wake_workflow(&self, workflow_id: Uuid) -> Result<u64, StoreError> {
        let done = sqlx::query(
            "UPDATE tasks SET status = 'SCHEDULED'
             WHERE workflow_id = ? AND status = 'SUSPENDED'",
        )
        .bind(workflow_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected())
    }

    async fn task_finish(&self, result: &TaskResultRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("UPDATE tasks SET status = 'COMPLETED', claimed_at = NULL WHERE id = ?")
            .bind(result.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO task_results (id, result, error) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET result = excluded.result, error = excluded.error",
        )
        .bind(result.id.to_string())
        .bind(result.result.as_deref())
        .bind(result.error.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn task_take_result(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TaskResultRecord>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let taken = sqlx::query(
            "DELETE FROM task_results WHERE id = ? RETURNING id, result, error",
        )
        .bind(task_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match taken {
            Some(row) => {
                let result = result_from_row(&row)?;
                sqlx::query("DELETE FROM tasks WHERE id = ?")
                    .bind(task_id.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                tx.commit().await.map_err(db_err)?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn task_requeue_stale(
        &self,
        queue_id: &str,
        older_than: Duration,
    ) -> Result<u64, StoreError> {
        let threshold =
            Utc::now() - chrono::Duration::milliseconds(older_than.as_millis() as i64);
        let done = sqlx::query(
            "UPDATE tasks SET status = 'SCHEDULED', claimed_at = NULL
             WHERE queue_id = ? AND status = 'RUNNING'
               AND claimed_at IS NOT NULL AND claimed_at < ?",
        )
        .bind(queue_id)
        .bind(millis(threshold))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path().join("lightemporal.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lightemporal.db");

        let first = SqliteStore::connect(&path).await.unwrap();
        drop(first);
        // Re-opening the same file must not fail on existing tables
        SqliteStore::connect(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_rejects_running_duplicate() {
        let (_dir, store) = temp_store().await;

        let first = store.workflow_get_or_create("greet", "[\"x\"]").await.unwrap();
        assert_eq!(first.status, WorkflowStatus::Running);

        let second = store.workflow_get_or_create("greet", "[\"x\"]").await;
        assert!(matches!(second, Err(StoreError::AlreadyRunning { .. })));
    }

    #[tokio::test]
    async fn test_get_or_create_revives_stopped_row() {
        let (_dir, store) = temp_store().await;

        let first = store.workflow_get_or_create("greet", "[]").await.unwrap();
        store
            .workflow_set_status(first.id, WorkflowStatus::Stopped)
            .await
            .unwrap();

        let revived = store.workflow_get_or_create("greet", "[]").await.unwrap();
        assert_eq!(revived.id, first.id);
        assert_eq!(revived.status, WorkflowStatus::Running);

        store
            .workflow_set_status(first.id, WorkflowStatus::Completed)
            .await
            .unwrap();
        let fresh = store.workflow_get_or_create("greet", "[]").await.unwrap();
        assert_ne!(fresh.id, first.id);
    }

    #[tokio::test]
    async fn test_activity_cache_round_trip() {
        let (_dir, store) = temp_store().await;
        let workflow_id = Uuid::new_v4();

        let record = ActivityRecord::new(workflow_id, "format#1", "[\"world\"]", "\"hi world\"");
        store.activity_save(&record).await.unwrap();

        let found = store
            .activity_find(workflow_id, "format#1", "[\"world\"]")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.output, "\"hi world\"");

        // Different input misses the cache
        assert!(store
            .activity_find(workflow_id, "format#1", "[\"moon\"]")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_signal_take_binds_fifo() {
        let (_dir, store) = temp_store().await;
        let workflow_id = Uuid::new_v4();

        let mut a = SignalRecord::new(workflow_id, "ping", "\"a\"");
        a.created_at = Utc::now() - chrono::Duration::seconds(3);
        let mut b = SignalRecord::new(workflow_id, "ping", "\"b\"");
        b.created_at = Utc::now() - chrono::Duration::seconds(2);
        store.signal_insert(&b).await.unwrap();
        store.signal_insert(&a).await.unwrap();

        let first = store.signal_take(workflow_id, "ping", 1).await.unwrap().unwrap();
        assert_eq!(first.content, "\"a\"");
        assert_eq!(first.step, Some(1));

        let again = store.signal_take(workflow_id, "ping", 1).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);

        let second = store.signal_take(workflow_id, "ping", 2).await.unwrap().unwrap();
        assert_eq!(second.content, "\"b\"");

        assert!(store.signal_take(workflow_id, "ping", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_marks_running_and_filters_by_time() {
        let (_dir, store) = temp_store().await;
        let now = Utc::now();

        let ready = TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: now - chrono::Duration::seconds(1),
            retry_count: 0,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Scheduled,
            workflow_id: None,
            claimed_at: None,
        };
        let future = TaskRecord {
            id: Uuid::new_v4(),
            timestamp: now + chrono::Duration::seconds(60),
            ..ready.clone()
        };
        store.task_upsert(&ready).await.unwrap();
        store.task_upsert(&future).await.unwrap();

        let claimed = store.task_claim_next("tasks", now).await.unwrap().unwrap();
        assert_eq!(claimed.id, ready.id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(claimed.claimed_at.is_some());

        assert!(store.task_claim_next("tasks", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_and_take_result() {
        let (_dir, store) = temp_store().await;
        let task = TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Running,
            workflow_id: None,
            claimed_at: Some(Utc::now()),
        };
        store.task_upsert(&task).await.unwrap();

        store
            .task_finish(&TaskResultRecord::failure(task.id, "boom"))
            .await
            .unwrap();
        assert_eq!(
            store.task_get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Completed
        );

        let result = store.task_take_result(task.id).await.unwrap().unwrap();
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(store.task_get(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wake_workflow_targets_suspended_tasks() {
        let (_dir, store) = temp_store().await;
        let workflow_id = Uuid::new_v4();

        let task = TaskRecord {
            id: Uuid::new_v4(),
            name: "wf.run".to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Running,
            workflow_id: Some(workflow_id),
            claimed_at: Some(Utc::now()),
        };
        store.task_upsert(&task).await.unwrap();

        assert!(store.task_suspend(task.id).await.unwrap());
        // Already suspended: no transition
        assert!(!store.task_suspend(task.id).await.unwrap());

        assert_eq!(store.task_wake_workflow(workflow_id).await.unwrap(), 1);
        assert_eq!(store.task_wake_workflow(workflow_id).await.unwrap(), 0);
        assert_eq!(
            store.task_get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Scheduled
        );
    }
}
