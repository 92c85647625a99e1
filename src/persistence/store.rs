//! Store trait definition and persisted record types
//!
//! The store owns all durable state: workflow rows, memoized activity
//! results, signals, queued tasks and task results. Every trait method is
//! atomic on its own; the read-modify-write sequences the engine depends
//! on (duplicate detection in `workflow_get_or_create`, signal binding,
//! task claiming, result hand-off) are expressed as single store
//! operations so callers never need a cross-call transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Workflow not found
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// A Running row already exists for this `(name, input)` pair
    #[error("workflow {name} is already running")]
    AlreadyRunning { name: String },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error (document store and its lock file)
    #[error("io error: {0}")]
    Io(String),
}

/// Workflow lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Workflow holds the active slot for its `(name, input)` pair
    Running,

    /// Terminal; a later submission of the same pair creates a new row
    Completed,

    /// Failed but resumable; `get_or_create` revives it
    Stopped,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Stopped => "STOPPED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(StoreError::Serialization(format!(
                "unknown workflow status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Scheduled,
    Running,
    Suspended,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Suspended => "SUSPENDED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "SCHEDULED" => Ok(Self::Scheduled),
            "RUNNING" => Ok(Self::Running),
            "SUSPENDED" => Ok(Self::Suspended),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(StoreError::Serialization(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable workflow row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub name: String,
    pub input: String,
    pub status: WorkflowStatus,
}

impl WorkflowRecord {
    /// Fresh Running row for a new submission
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            input: input.into(),
            status: WorkflowStatus::Running,
        }
    }
}

/// A memoized activity result; the replay cache entry for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Per-ordinal name of the form `userName#k`
    pub name: String,
    pub input: String,
    pub output: String,
}

impl ActivityRecord {
    pub fn new(
        workflow_id: Uuid,
        name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.into(),
            input: input.into(),
            output: output.into(),
        }
    }
}

/// A delivered signal; `step == None` until a matching wait consumes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub content: String,
    pub step: Option<u32>,
    /// Orders unbound signals so the oldest binds first
    pub created_at: DateTime<Utc>,
}

impl SignalRecord {
    pub fn new(workflow_id: Uuid, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.into(),
            content: content.into(),
            step: None,
            created_at: Utc::now(),
        }
    }
}

/// A queued unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub name: String,
    /// Earliest instant the task becomes eligible for pickup
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub input: String,
    pub queue_id: String,
    pub status: TaskStatus,
    /// Set on workflow-run tasks so a wake-up can find them
    pub workflow_id: Option<Uuid>,
    /// Set on claim; drives the stale-task requeue sweep
    pub claimed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Copy rescheduled after `delay` with the retry counter bumped
    pub fn retry(&self, delay: Duration) -> Self {
        let mut task = self.clone();
        task.retry_count += 1;
        task.timestamp = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        task.status = TaskStatus::Scheduled;
        task.claimed_at = None;
        task
    }

    /// Copy shifted to an absolute instant, retry counter untouched
    pub fn later(&self, at: DateTime<Utc>) -> Self {
        let mut task = self.clone();
        task.timestamp = at;
        task.status = TaskStatus::Scheduled;
        task.claimed_at = None;
        task
    }
}

/// Outcome slot for a finished task: exactly one of result/error is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultRecord {
    pub id: Uuid,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskResultRecord {
    pub fn success(task_id: Uuid, result: impl Into<String>) -> Self {
        Self {
            id: task_id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(task_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id: task_id,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Transactional persistence for the engine's five record kinds.
///
/// Implementations must be thread-safe and may be shared across workers
/// and processes. Two claimants racing on `task_claim_next` must never
/// both observe the same task.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // =========================================================================
    // Workflow operations
    // =========================================================================

    async fn workflow_get(&self, id: Uuid) -> Result<Option<WorkflowRecord>, StoreError>;

    /// Atomic get-or-create for the `(name, input)` active slot:
    /// a Running duplicate is rejected, a Stopped duplicate is revived to
    /// Running, otherwise a fresh Running row is inserted.
    async fn workflow_get_or_create(
        &self,
        name: &str,
        input: &str,
    ) -> Result<WorkflowRecord, StoreError>;

    /// Update a workflow's status, returning the updated row
    async fn workflow_set_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
    ) -> Result<WorkflowRecord, StoreError>;

    // =========================================================================
    // Activity result operations
    // =========================================================================

    async fn activity_find(
        &self,
        workflow_id: Uuid,
        name: &str,
        input: &str,
    ) -> Result<Option<ActivityRecord>, StoreError>;

    /// Insert, or update `output` on id conflict
    async fn activity_save(&self, record: &ActivityRecord) -> Result<(), StoreError>;

    // =========================================================================
    // Signal operations
    // =========================================================================

    async fn signal_insert(&self, record: &SignalRecord) -> Result<(), StoreError>;

    /// Atomic lookup-or-bind: return the row already bound to `step`, or
    /// bind the oldest unbound `(workflow_id, name)` row to `step` and
    /// return it.
    async fn signal_take(
        &self,
        workflow_id: Uuid,
        name: &str,
        step: u32,
    ) -> Result<Option<SignalRecord>, StoreError>;

    // =========================================================================
    // Task queue operations
    // =========================================================================

    /// Insert Scheduled, or on id conflict reset timestamp, retry count
    /// and status (re-enqueue semantics)
    async fn task_upsert(&self, record: &TaskRecord) -> Result<(), StoreError>;

    async fn task_get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError>;

    /// Atomically claim the earliest-ready Scheduled task
    /// (`timestamp <= now`, ordered by `(timestamp, id)`), marking it
    /// Running.
    async fn task_claim_next(
        &self,
        queue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError>;

    /// Scheduled or Running -> Suspended; returns whether a row changed
    async fn task_suspend(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Suspended -> Scheduled; returns whether a row changed
    async fn task_wakeup(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Wake every Suspended task belonging to a workflow
    async fn task_wake_workflow(&self, workflow_id: Uuid) -> Result<u64, StoreError>;

    /// Mark the task Completed and upsert its result slot
    async fn task_finish(&self, result: &TaskResultRecord) -> Result<(), StoreError>;

    /// Atomically delete the task and its result slot, returning the
    /// deleted result; `None` when no result has been recorded yet.
    async fn task_take_result(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TaskResultRecord>, StoreError>;

    /// Recovery sweep: Running tasks claimed before the threshold go back
    /// to Scheduled. Returns how many rows were reset.
    async fn task_requeue_stale(
        &self,
        queue_id: &str,
        older_than: Duration,
    ) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            WorkflowStatus::Running,
            WorkflowStatus::Completed,
            WorkflowStatus::Stopped,
        ] {
            assert_eq!(WorkflowStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(WorkflowStatus::parse("PENDING").is_err());
    }

    #[test]
    fn test_task_retry_bumps_counter_and_timestamp() {
        let task = TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: Utc::now(),
            retry_count: 1,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Running,
            workflow_id: None,
            claimed_at: Some(Utc::now()),
        };

        let before = Utc::now();
        let retried = task.retry(Duration::from_secs(2));

        assert_eq!(retried.retry_count, 2);
        assert_eq!(retried.status, TaskStatus::Scheduled);
        assert!(retried.claimed_at.is_none());
        assert!(retried.timestamp >= before + chrono::Duration::seconds(2));
    }

    #[test]
    fn test_task_later_keeps_retry_count() {
        let task = TaskRecord {
            id: Uuid::new_v4(),
            name: "noop".to_string(),
            timestamp: Utc::now(),
            retry_count: 3,
            input: "null".to_string(),
            queue_id: "tasks".to_string(),
            status: TaskStatus::Running,
            workflow_id: None,
            claimed_at: None,
        };

        let at = Utc::now() + chrono::Duration::seconds(30);
        let shifted = task.later(at);

        assert_eq!(shifted.retry_count, 3);
        assert_eq!(shifted.timestamp, at);
        assert_eq!(shifted.status, TaskStatus::Scheduled);
    }

    #[test]
    fn test_result_record_xor() {
        let ok = TaskResultRecord::success(Uuid::new_v4(), "42");
        assert!(ok.result.is_some() && ok.error.is_none());

        let err = TaskResultRecord::failure(Uuid::new_v4(), "boom");
        assert!(err.result.is_none() && err.error.is_some());
    }
}
