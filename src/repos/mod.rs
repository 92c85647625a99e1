//! Typed repositories over the store
//!
//! Each repository wraps an `Arc<dyn Store>` and exposes the accessors one
//! entity needs, carrying that entity's integrity rules in its signatures:
//! `WorkflowRepo` owns the active-slot lifecycle, `ActivityRepo` the replay
//! cache, `SignalRepo` the bind-on-wait rendezvous and `TaskRepo` the queue
//! rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::persistence::{
    ActivityRecord, SignalRecord, Store, StoreError, TaskRecord, TaskResultRecord,
    WorkflowRecord, WorkflowStatus,
};

/// Workflow lifecycle accessors
#[derive(Clone)]
pub struct WorkflowRepo {
    store: Arc<dyn Store>,
}

impl WorkflowRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Obtain the active slot for `(name, input)`: rejects a Running
    /// duplicate, revives a Stopped one, creates otherwise
    pub async fn get_or_create(
        &self,
        name: &str,
        input: &str,
    ) -> Result<WorkflowRecord, StoreError> {
        self.store.workflow_get_or_create(name, input).await
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkflowRecord, StoreError> {
        self.store
            .workflow_get(id)
            .await?
            .ok_or(StoreError::WorkflowNotFound(id))
    }

    /// Terminal success transition
    pub async fn complete(&self, workflow: &WorkflowRecord) -> Result<WorkflowRecord, StoreError> {
        self.store
            .workflow_set_status(workflow.id, WorkflowStatus::Completed)
            .await
    }

    /// Resumable failure transition
    pub async fn failed(&self, workflow: &WorkflowRecord) -> Result<WorkflowRecord, StoreError> {
        self.store
            .workflow_set_status(workflow.id, WorkflowStatus::Stopped)
            .await
    }
}

/// Replay-cache accessors
#[derive(Clone)]
pub struct ActivityRepo {
    store: Arc<dyn Store>,
}

impl ActivityRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn may_find_one(
        &self,
        workflow_id: Uuid,
        name: &str,
        input: &str,
    ) -> Result<Option<ActivityRecord>, StoreError> {
        self.store.activity_find(workflow_id, name, input).await
    }

    pub async fn save(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        self.store.activity_save(record).await
    }
}

/// Signal delivery and binding accessors
#[derive(Clone)]
pub struct SignalRepo {
    store: Arc<dyn Store>,
}

impl SignalRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn insert(&self, record: &SignalRecord) -> Result<(), StoreError> {
        self.store.signal_insert(record).await
    }

    /// Return the signal bound to `step`, or bind the oldest unbound one
    pub async fn may_find_one(
        &self,
        workflow_id: Uuid,
        name: &str,
        step: u32,
    ) -> Result<Option<SignalRecord>, StoreError> {
        self.store.signal_take(workflow_id, name, step).await
    }
}

/// Queue-row accessors used by [`TaskQueue`](crate::queue::TaskQueue)
#[derive(Clone)]
pub struct TaskRepo {
    store: Arc<dyn Store>,
}

impl TaskRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn put(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.store.task_upsert(record).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        self.store.task_get(id).await
    }

    pub async fn claim_next(
        &self,
        queue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        self.store.task_claim_next(queue_id, now).await
    }

    pub async fn suspend(&self, id: Uuid) -> Result<bool, StoreError> {
        self.store.task_suspend(id).await
    }

    pub async fn wakeup(&self, id: Uuid) -> Result<bool, StoreError> {
        self.store.task_wakeup(id).await
    }

    pub async fn wake_workflow(&self, workflow_id: Uuid) -> Result<u64, StoreError> {
        self.store.task_wake_workflow(workflow_id).await
    }

    pub async fn finish(&self, result: &TaskResultRecord) -> Result<(), StoreError> {
        self.store.task_finish(result).await
    }

    pub async fn take_result(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TaskResultRecord>, StoreError> {
        self.store.task_take_result(task_id).await
    }

    pub async fn requeue_stale(
        &self,
        queue_id: &str,
        older_than: Duration,
    ) -> Result<u64, StoreError> {
        self.store.task_requeue_stale(queue_id, older_than).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::DocumentStore;

    fn temp_repos() -> (tempfile::TempDir, Arc<dyn Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(DocumentStore::open(dir.path().join("lightemporal.db")));
        (dir, store)
    }

    #[tokio::test]
    async fn test_complete_then_new_row() {
        let (_dir, store) = temp_repos();
        let repo = WorkflowRepo::new(store);

        let first = repo.get_or_create("greet", "[]").await.unwrap();
        let completed = repo.complete(&first).await.unwrap();
        assert_eq!(completed.status, WorkflowStatus::Completed);

        let next = repo.get_or_create("greet", "[]").await.unwrap();
        assert_ne!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_failed_then_same_row_revived() {
        let (_dir, store) = temp_repos();
        let repo = WorkflowRepo::new(store);

        let first = repo.get_or_create("greet", "[]").await.unwrap();
        let failed = repo.failed(&first).await.unwrap();
        assert_eq!(failed.status, WorkflowStatus::Stopped);

        let revived = repo.get_or_create("greet", "[]").await.unwrap();
        assert_eq!(revived.id, first.id);
        assert_eq!(revived.status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_get_missing_workflow_is_not_found() {
        let (_dir, store) = temp_repos();
        let repo = WorkflowRepo::new(store);

        let missing = repo.get(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(StoreError::WorkflowNotFound(_))));
    }
}
