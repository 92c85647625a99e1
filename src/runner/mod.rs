//! Execution strategies
//!
//! Two orthogonal contracts, selected through the [`Env`]:
//! - [`Runner`]: turns a workflow invocation into execution (inline,
//!   spawned task, or queued onto the durable queue)
//! - [`Executor`]: implements the engine's suspension primitives for the
//!   current mode
//!
//! Three pairings ship: [`DirectRunner`]/[`DirectExecutor`],
//! [`SpawnRunner`]/[`SpawnExecutor`] and [`QueueRunner`]/[`QueueExecutor`].

mod direct;
mod queued;
mod spawn;

pub use direct::{DirectExecutor, DirectRunner};
pub use queued::{QueueExecutor, QueueRunner};
pub use spawn::{SpawnExecutor, SpawnRunner};

pub(crate) use queued::{create_task_name, run_task_name};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::env::Env;
use crate::error::Error;
use crate::queue::TaskQueue;
use crate::workflow::AnyWorkflow;

/// Strategy that turns a workflow invocation into execution
#[async_trait]
pub trait Runner: Send + Sync {
    /// Create the workflow and drive it to a result
    async fn run(
        &self,
        env: &Env,
        workflow: Arc<dyn AnyWorkflow>,
        raw_input: String,
    ) -> Result<String, Error>;

    /// Create the workflow and return a handle to its eventual result
    async fn start(
        &self,
        env: &Env,
        workflow: Arc<dyn AnyWorkflow>,
        raw_input: String,
    ) -> Result<Handle, Error>;

    /// Resume a workflow parked on a signal wait
    async fn wake_up(&self, env: &Env, workflow_id: Uuid) -> Result<(), Error>;
}

/// Strategy behind the engine's suspension primitives
#[async_trait]
pub trait Executor: Send + Sync {
    /// Park until a wall-clock instant (timer sleep)
    async fn suspend_until(&self, workflow_id: Uuid, at: DateTime<Utc>) -> Result<(), Error>;

    /// Park until an external wake-up (signal wait)
    async fn suspend(&self, workflow_id: Uuid) -> Result<(), Error>;
}

/// Handle on an asynchronously started workflow
pub struct Handle {
    workflow_id: Uuid,
    inner: HandleInner,
}

enum HandleInner {
    /// In-process execution joined through its spawned task
    Join(JoinHandle<Result<String, Error>>),
    /// Queue-backed execution tracked by its run task
    Queued {
        queue: Arc<TaskQueue>,
        task_id: Uuid,
    },
}

impl Handle {
    pub(crate) fn joined(workflow_id: Uuid, join: JoinHandle<Result<String, Error>>) -> Self {
        Self {
            workflow_id,
            inner: HandleInner::Join(join),
        }
    }

    pub(crate) fn queued(workflow_id: Uuid, queue: Arc<TaskQueue>, task_id: Uuid) -> Self {
        Self {
            workflow_id,
            inner: HandleInner::Queued { queue, task_id },
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// The backing run task, when the workflow was queued
    pub fn task_id(&self) -> Option<Uuid> {
        match &self.inner {
            HandleInner::Queued { task_id, .. } => Some(*task_id),
            HandleInner::Join(_) => None,
        }
    }

    /// Block until the workflow finishes and return its raw output
    pub async fn result(self) -> Result<String, Error> {
        match self.inner {
            HandleInner::Join(join) => join
                .await
                .map_err(|err| Error::Failure(format!("workflow task aborted: {err}")))?,
            HandleInner::Queued { queue, task_id } => queue.get_result(task_id, true).await,
        }
    }
}
