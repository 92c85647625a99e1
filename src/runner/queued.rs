//! Queue-backed (worker-pool) execution
//!
//! The runner turns a workflow invocation into two queued tasks: the
//! create task yields the workflow id, the run task replays the body on a
//! worker. Suspension is the control-flow signal [`Error::Suspended`],
//! which the worker loop translates into a queue mutation; a wake-up
//! reschedules the workflow's suspended run task through the store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{Executor, Handle, Runner};
use crate::codec::CodecError;
use crate::env::Env;
use crate::error::Error;
use crate::queue::TaskCall;
use crate::repos::TaskRepo;
use crate::workflow::AnyWorkflow;

/// Task name of a workflow's create handler
pub(crate) fn create_task_name(workflow: &str) -> String {
    format!("{workflow}.create")
}

/// Task name of a workflow's run handler
pub(crate) fn run_task_name(workflow: &str) -> String {
    format!("{workflow}.run")
}

/// Enqueues workflow execution onto the durable queue
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueRunner;

#[async_trait]
impl Runner for QueueRunner {
    async fn run(
        &self,
        env: &Env,
        workflow: Arc<dyn AnyWorkflow>,
        raw_input: String,
    ) -> Result<String, Error> {
        self.start(env, workflow, raw_input).await?.result().await
    }

    async fn start(
        &self,
        env: &Env,
        workflow: Arc<dyn AnyWorkflow>,
        raw_input: String,
    ) -> Result<Handle, Error> {
        let queue = env.queue().clone();

        // The create task resolves the workflow id before the run task is
        // enqueued, so the handle always knows which workflow it tracks.
        let create = TaskCall::new(create_task_name(workflow.name()), raw_input);
        let raw_id = queue.execute(&create).await?;
        let workflow_id: Uuid = serde_json::from_str(&raw_id).map_err(CodecError::from)?;

        let run = TaskCall::new(run_task_name(workflow.name()), raw_id)
            .for_workflow(workflow_id);
        let task_id = queue.call(&run).await?;
        debug!(%workflow_id, %task_id, workflow = workflow.name(), "queued workflow run");

        Ok(Handle::queued(workflow_id, queue, task_id))
    }

    async fn wake_up(&self, env: &Env, workflow_id: Uuid) -> Result<(), Error> {
        let woken = TaskRepo::new(env.store().clone())
            .wake_workflow(workflow_id)
            .await?;
        debug!(%workflow_id, woken, "woke queued workflow");
        Ok(())
    }
}

/// Raises the suspension control-flow signal for the worker loop to catch
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueExecutor;

#[async_trait]
impl Executor for QueueExecutor {
    async fn suspend_until(&self, _workflow_id: Uuid, at: DateTime<Utc>) -> Result<(), Error> {
        Err(Error::Suspended {
            resume_at: Some(at),
        })
    }

    async fn suspend(&self, _workflow_id: Uuid) -> Result<(), Error> {
        Err(Error::Suspended { resume_at: None })
    }
}
