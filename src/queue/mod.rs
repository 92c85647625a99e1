//! Durable task queue
//!
//! One persistent queue per `queue_id`, backed by the store's task table.
//! Tasks are picked earliest-ready first; blocking operations poll on a
//! fixed backoff rather than treating an empty queue as an error. Result
//! hand-off goes through per-task result slots that are consumed (deleted)
//! by the reader.

mod call;

pub use call::TaskCall;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::persistence::{Store, TaskRecord, TaskResultRecord};
use crate::repos::TaskRepo;

const DEFAULT_QUEUE_ID: &str = "tasks";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Durable, earliest-ready-first task queue with typed result slots
pub struct TaskQueue {
    tasks: TaskRepo,
    queue_id: String,
    poll_interval: Duration,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            tasks: TaskRepo::new(store),
            queue_id: DEFAULT_QUEUE_ID.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_queue_id(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = queue_id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Enqueue a call, ready now
    pub async fn call(&self, call: &TaskCall) -> Result<Uuid, Error> {
        self.call_at(call, Utc::now()).await
    }

    /// Enqueue a call, ready after `delay`
    pub async fn call_later(&self, call: &TaskCall, delay: Duration) -> Result<Uuid, Error> {
        let at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        self.call_at(call, at).await
    }

    /// Enqueue a call, ready at an absolute instant
    pub async fn call_at(&self, call: &TaskCall, at: DateTime<Utc>) -> Result<Uuid, Error> {
        let task = call.to_task(&self.queue_id, at);
        self.tasks.put(&task).await?;
        debug!(task_id = %task.id, task = %task.name, "enqueued task");
        Ok(task.id)
    }

    /// Re-enqueue an existing task row (retry / reschedule semantics);
    /// keeps the task id so handles stay valid
    pub async fn requeue(&self, task: &TaskRecord) -> Result<(), Error> {
        self.tasks.put(task).await?;
        debug!(task_id = %task.id, task = %task.name, "requeued task");
        Ok(())
    }

    /// Claim the next ready task, blocking until one is available
    pub async fn get_next_task(&self) -> Result<TaskRecord, Error> {
        loop {
            if let Some(task) = self.try_get_next_task().await? {
                return Ok(task);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Claim the next ready task, or `None` when the queue is idle
    pub async fn try_get_next_task(&self) -> Result<Option<TaskRecord>, Error> {
        Ok(self.tasks.claim_next(&self.queue_id, Utc::now()).await?)
    }

    /// Park a scheduled or running task
    pub async fn suspend(&self, task: &TaskRecord) -> Result<bool, Error> {
        Ok(self.tasks.suspend(task.id).await?)
    }

    /// Return a suspended task to the schedulable pool
    pub async fn wakeup(&self, task_id: Uuid) -> Result<bool, Error> {
        Ok(self.tasks.wakeup(task_id).await?)
    }

    /// Record a successful outcome and complete the task
    pub async fn set_result(&self, task_id: Uuid, result: String) -> Result<(), Error> {
        self.tasks
            .finish(&TaskResultRecord::success(task_id, result))
            .await?;
        Ok(())
    }

    /// Record a failed outcome and complete the task
    pub async fn set_error(&self, task_id: Uuid, error: String) -> Result<(), Error> {
        self.tasks
            .finish(&TaskResultRecord::failure(task_id, error))
            .await?;
        Ok(())
    }

    /// Consume a task's result slot, deleting the task and the slot.
    ///
    /// A recorded error surfaces as [`Error::Failure`]. When no result
    /// exists yet, a blocking call polls on the queue's backoff and a
    /// non-blocking one fails with [`Error::Empty`].
    pub async fn get_result(&self, task_id: Uuid, blocking: bool) -> Result<String, Error> {
        loop {
            if let Some(slot) = self.tasks.take_result(task_id).await? {
                return match (slot.result, slot.error) {
                    (Some(result), _) => Ok(result),
                    (None, Some(error)) => Err(Error::Failure(error)),
                    (None, None) => Err(Error::Failure("empty task result slot".to_string())),
                };
            }
            if !blocking {
                return Err(Error::Empty);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Enqueue and wait for the outcome
    pub async fn execute(&self, call: &TaskCall) -> Result<String, Error> {
        let task_id = self.call(call).await?;
        self.get_result(task_id, true).await
    }
}
