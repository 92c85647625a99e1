//! File-backed JSON document implementation of [`Store`]
//!
//! The whole database is one JSON document holding a map per record kind.
//! Each operation is a locked read-modify-write of the document: an
//! in-process mutex serializes local callers and a `<path>.lock` sidecar
//! file serializes processes. An error raised inside the critical section
//! skips the write-back, so failed operations leave the file untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::lock::FileLock;
use super::store::*;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    workflows: BTreeMap<Uuid, WorkflowRecord>,
    #[serde(default)]
    activities: BTreeMap<Uuid, ActivityRecord>,
    #[serde(default)]
    signals: BTreeMap<Uuid, SignalRecord>,
    #[serde(default)]
    tasks: BTreeMap<Uuid, TaskRecord>,
    #[serde(default)]
    task_results: BTreeMap<Uuid, TaskResultRecord>,
}

/// JSON-document implementation of [`Store`]
///
/// Conformant with the SQLite variant; the engine and its tests treat the
/// two interchangeably.
///
/// # Example
///
/// ```ignore
/// use lightemporal::DocumentStore;
///
/// let store = DocumentStore::open("lightemporal.db");
/// ```
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    lock_path: PathBuf,
    local: Mutex<()>,
}

impl DocumentStore {
    /// Open (or lazily create) the document at `path`; the sidecar lock
    /// file lives at `<path>.lock`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        Self {
            path,
            lock_path,
            local: Mutex::new(()),
        }
    }

    /// Open the default `./lightemporal.db` document
    pub fn open_default() -> Self {
        Self::open("lightemporal.db")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::default()),
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(doc).map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Locked read-modify-write scope; the write-back only happens when
    /// the closure succeeds
    async fn with_doc<T>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _local = self.local.lock().await;
        let _lock = FileLock::acquire(&self.lock_path).await?;
        let mut doc = self.load()?;
        let out = f(&mut doc)?;
        self.save(&doc)?;
        Ok(out)
    }

    /// Locked read-only scope
    async fn read_doc<T>(
        &self,
        f: impl FnOnce(&Document) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _local = self.local.lock().await;
        let _lock = FileLock::acquire(&self.lock_path).await?;
        let doc = self.load()?;
        f(&doc)
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lightemporal.db".to_string());
    name.push_str(".lock");
    path.with_file_name(name)
}

#[async_trait]
impl Store for DocumentStore {
    async fn workflow_get(&self, id: Uuid) -> Result<Option<WorkflowRecord>, StoreError> {
        self.read_doc(|doc| Ok(doc.workflows.get(&id).cloned()))
            .await
    }

    async fn workflow_get_or_create(
        &self,
        name: &str,
        input: &str,
    ) -> Result<WorkflowRecord, StoreError> {
        self.with_doc(|doc| {
            let running = doc.workflows.values().any(|w| {
                w.name == name && w.input == input && w.status == WorkflowStatus::Running
            });
            if running {
                return Err(StoreError::AlreadyRunning {
                    name: name.to_string(),
                });
            }

            let stopped = doc
                .workflows
                .values()
                .find(|w| {
                    w.name == name && w.input == input && w.status == WorkflowStatus::Stopped
                })
                .map(|w| w.id);

            if let Some(id) = stopped {
                let workflow = doc
                    .workflows
                    .get_mut(&id)
                    .ok_or(StoreError::WorkflowNotFound(id))?;
                workflow.status = WorkflowStatus::Running;
                debug!(workflow_id = %id, %name, "revived stopped workflow");
                return Ok(workflow.clone());
            }

            let workflow = WorkflowRecord::new(name, input);
            doc.workflows.insert(workflow.id, workflow.clone());
            debug!(workflow_id = %workflow.id, %name, "created workflow");
            Ok(workflow)
        })
        .await
    }

    async fn workflow_set_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
    ) -> Result<WorkflowRecord, StoreError> {
        self.with_doc(|doc| {
            let workflow = doc
                .workflows
                .get_mut(&id)
                .ok_or(StoreError::WorkflowNotFound(id))?;
            workflow.status = status;
            Ok(workflow.clone())
        })
        .await
    }

    async fn activity_find(
        &self,
        workflow_id: Uuid,
        name: &str,
        input: &str,
    ) -> Result<Option<ActivityRecord>, StoreError> {
        self.read_doc(|doc| {
            Ok(doc
                .activities
                .values()
                .find(|a| a.workflow_id == workflow_id && a.name == name && a.input == input)
                .cloned())
        })
        .await
    }

    async fn activity_save(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        self.with_doc(|doc| {
            doc.activities
                .entry(record.id)
                .and_modify(|existing| existing.output = record.output.clone())
                .or_insert_with(|| record.clone());
            Ok(())
        })
        .await
    }

    async fn signal_insert(&self, record: &SignalRecord) -> Result<(), StoreError> {
        self.with_doc(|doc| {
            doc.signals.insert(record.id, record.clone());
            Ok(())
        })
        .await
    }

    async fn signal_take(
        &self,
        workflow_id: Uuid,
        name: &str,
        step: u32,
    ) -> Result<Option<SignalRecord>, StoreError> {
        self.with_doc(|doc| {
            if let Some(bound) = doc.signals.values().find(|s| {
                s.workflow_id == workflow_id && s.name == name && s.step == Some(step)
            }) {
                return Ok(Some(bound.clone()));
            }

            let oldest = doc
                .signals
                .values()
                .filter(|s| s.workflow_id == workflow_id && s.name == name && s.step.is_none())
                .min_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
                .map(|s| s.id);

            match oldest {
                Some(id) => {
                    let signal = doc
                        .signals
                        .get_mut(&id)
                        .ok_or_else(|| StoreError::Database("signal row vanished".to_string()))?;
                    signal.step = Some(step);
                    debug!(%workflow_id, signal = name, step, "bound signal");
                    Ok(Some(signal.clone()))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn task_upsert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.with_doc(|doc| {
            doc.tasks
                .entry(record.id)
                .and_modify(|existing| {
                    existing.timestamp = record.timestamp;
                    existing.retry_count = record.retry_count;
                    existing.status = record.status;
                    existing.claimed_at = record.claimed_at;
                })
                .or_insert_with(|| record.clone());
            Ok(())
        })
        .await
    }

    async fn task_get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        self.read_doc(|doc| Ok(doc.tasks.get(&id).cloned())).await
    }

    async fn task_claim_next(
        &self,
        queue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        self.with_doc(|doc| {
            let next = doc
                .tasks
                .values()
                .filter(|t| {
                    t.queue_id == queue_id
                        && t.status == TaskStatus::Scheduled
                        && t.timestamp <= now
                })
                .min_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)))
                .map(|t| t.id);

            match next {
                Some(id) => {
                    let task = doc
                        .tasks
                        .get_mut(&id)
                        .ok_or_else(|| StoreError::Database("task row vanished".to_string()))?;
                    task.status = TaskStatus::Running;
                    task.claimed_at = Some(now);
                    debug!(task_id = %id, task = %task.name, "claimed task");
                    Ok(Some(task.clone()))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn task_suspend(&self, id: Uuid) -> Result<bool, StoreError> {
        self.with_doc(|doc| match doc.tasks.get_mut(&id) {
            Some(task)
                if matches!(task.status, TaskStatus::Scheduled | TaskStatus::Running) =>
            {
                task.status = TaskStatus::Suspended;
                Ok(true)
            }
            _ => Ok(false),
        })
        .await
    }

    async fn task_wakeup(&self, id: Uuid) -> Result<bool, StoreError> {
        self.with_doc(|doc| match doc.tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Suspended => {
                task.status = TaskStatus::Scheduled;
                Ok(true)
            }
            _ => Ok(false),
        })
        .await
    }

    async fn task_wake_workflow(&self, workflow_id: Uuid) -> Result<u64, StoreError> {
        self.with_doc(|doc| {
            let mut woken = 0;
            for task in doc.tasks.values_mut() {
                if task.workflow_id == Some(workflow_id) && task.status == TaskStatus::Suspended {
                    task.status = TaskStatus::Scheduled;
                    woken += 1;
                }
            }
            Ok(woken)
        })
        .await
    }

    async fn task_finish(&self, result: &TaskResultRecord) -> Result<(), StoreError> {
        self.with_doc(|doc| {
            if let Some(task) = doc.tasks.get_mut(&result.id) {
                task.status = TaskStatus::Completed;
                task.claimed_at = None;
            }
            doc.task_results.insert(result.id, result.clone());
            Ok(())
        })
        .await
    }

    async fn task_take_result(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TaskResultRecord>, StoreError> {
        self.with_doc(|doc| match doc.task_results.remove(&task_id) {
            Some(result) => {
                doc.tasks.remove(&task_id);
                Ok(Some(result))
            }
            None => Ok(None),
        })
        .await
    }

    async fn task_requeue_stale(
        &self,
        queue_id: &str,
        older_than: Duration,
    ) -> Result<u64, StoreError> {
        let threshold =
            Utc::now() - chrono::Duration::milliseconds(older_than.as_millis() as i64);
        self.with_doc(|doc| {
            let mut reset = 0;
            for task in doc.tasks.values_mut() {
                if task.queue_id == queue_id
                    && task.status == TaskStatus::Running
                    && task.claimed_at.is_some_and(|at| at < threshold)
                {
                    task.status = TaskStatus::Scheduled;
                    task.claimed_at = None;
                    reset += 1;
                }
            }
            Ok(reset)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("lightemporal.db"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_get_or_create_rejects_running_duplicate() {
        let (_dir, store) = temp_store();

        let first = store.workflow_get_or_create("greet", "[\"x\"]").await.unwrap();
        assert_eq!(first.status, WorkflowStatus::Running);

        let second = store.workflow_get_or_create("greet", "[\"x\"]").await;
        assert!(matches!(second, Err(StoreError::AlreadyRunning { .. })));
    }

    #[tokio::test]
    async fn test_get_or_create_revives_stopped() {
        let (_dir, store) = temp_store();

        let first = store.workflow_get_or_create("greet", "[]").await.unwrap();
        store
            .workflow_set_status(first.id, WorkflowStatus::Stopped)
            .await
            .unwrap();

        let revived = store.workflow_get_or_create("greet", "[]").await.unwrap();
        assert_eq!(revived.id, first.id);
        assert_eq!(revived.status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_completed_is_terminal_for_the_pair() {
        let (_dir, store) = temp_store();

        let first = store.workflow_get_or_create("greet", "[]").await.unwrap();
        store
            .workflow_set_status(first.id, WorkflowStatus::Completed)
            .await
            .unwrap();

        let next = store.workflow_get_or_create("greet", "[]").await.unwrap();
        assert_ne!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_signal_take_binds_oldest_first() {
        let (_dir, store) = temp_store();
        let workflow_id = Uuid::new_v4();

        let mut a = SignalRecord::new(workflow_id, "ping", "\"a\"");
        a.created_at = Utc::now() - chrono::Duration::seconds(3);
        let mut b = SignalRecord::new(workflow_id, "ping", "\"b\"");
        b.created_at = Utc::now() - chrono::Duration::seconds(2);
        store.signal_insert(&b).await.unwrap();
        store.signal_insert(&a).await.unwrap();

        let first = store.signal_take(workflow_id, "ping", 1).await.unwrap().unwrap();
        assert_eq!(first.content, "\"a\"");

        // Same step again returns the bound row, not a new bind
        let again = store.signal_take(workflow_id, "ping", 1).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);

        let second = store.signal_take(workflow_id, "ping", 2).await.unwrap().unwrap();
        assert_eq!(second.content, "\"b\"");

        assert!(store.signal_take(workflow_id, "ping", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_orders_by_timestamp() {
        let (_dir, store) = temp_store();
        let now = Utc::now();

        let mk = |offset_ms: i64| TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: now + chrono::Duration::milliseconds(offset_ms),
            retry_count: 0,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Scheduled,
            workflow_id: None,
            claimed_at: None,
        };

        let late = mk(-10);
        let early = mk(-500);
        let future = mk(60_000);
        for task in [&late, &early, &future] {
            store.task_upsert(task).await.unwrap();
        }

        let first = store.task_claim_next("tasks", now).await.unwrap().unwrap();
        assert_eq!(first.id, early.id);
        assert_eq!(first.status, TaskStatus::Running);

        let second = store.task_claim_next("tasks", now).await.unwrap().unwrap();
        assert_eq!(second.id, late.id);

        // The future task is not yet eligible
        assert!(store.task_claim_next("tasks", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_suspend_wakeup_cycle() {
        let (_dir, store) = temp_store();
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
        assert_eq!(
            store.task_get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Suspended
        );

        // Suspended tasks are not claimable
        assert!(store.task_claim_next("tasks", Utc::now()).await.unwrap().is_none());

        assert_eq!(store.task_wake_workflow(workflow_id).await.unwrap(), 1);
        assert_eq!(
            store.task_get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_take_result_removes_both_rows() {
        let (_dir, store) = temp_store();
        let task = TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Running,
            workflow_id: None,
            claimed_at: None,
        };
        store.task_upsert(&task).await.unwrap();

        assert!(store.task_take_result(task.id).await.unwrap().is_none());

        store
            .task_finish(&TaskResultRecord::success(task.id, "\"done\""))
            .await
            .unwrap();

        let result = store.task_take_result(task.id).await.unwrap().unwrap();
        assert_eq!(result.result.as_deref(), Some("\"done\""));
        assert!(store.task_get(task.id).await.unwrap().is_none());
        assert!(store.task_take_result(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requeue_stale_resets_old_running_tasks() {
        let (_dir, store) = temp_store();
        let task = TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: Utc::now() - chrono::Duration::seconds(60),
            retry_count: 0,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Running,
            workflow_id: None,
            claimed_at: Some(Utc::now() - chrono::Duration::seconds(60)),
        };
        store.task_upsert(&task).await.unwrap();

        assert_eq!(
            store
                .task_requeue_stale("tasks", Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .task_requeue_stale("tasks", Duration::from_secs(1))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store.task_get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Scheduled
        );
    }
}
