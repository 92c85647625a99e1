//! In-process concurrent execution
//!
//! One tokio task per workflow. Signal suspension parks the workflow on a
//! per-workflow [`Notify`] shared between the executor (which waits) and
//! the runner (which wakes); the spawned task receives a snapshot of the
//! parent environment with the spawn executor installed, so activity and
//! queue lookups keep working across the task boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use super::{DirectExecutor, Executor, Handle, Runner};
use crate::env::Env;
use crate::error::Error;
use crate::workflow::AnyWorkflow;

/// Per-workflow wake flags shared between a [`SpawnRunner`] and the
/// [`SpawnExecutor`]s it installs
type WakeSet = DashMap<Uuid, Arc<Notify>>;

fn wake_flag(wakes: &WakeSet, workflow_id: Uuid) -> Arc<Notify> {
    let entry = wakes.entry(workflow_id).or_default();
    Arc::clone(entry.value())
}

/// Spawns one task per workflow; handles join the task
#[derive(Debug, Default)]
pub struct SpawnRunner {
    wakes: Arc<WakeSet>,
}

impl SpawnRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Runner for SpawnRunner {
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
        let env = env.clone().with_executor(Arc::new(SpawnExecutor {
            wakes: self.wakes.clone(),
        }));

        let workflow_id = workflow.create_raw(&env, &raw_input).await?;

        let join = tokio::spawn({
            let env = env.clone();
            let workflow = workflow.clone();
            async move { workflow.resume_raw(&env, workflow_id).await }
        });

        Ok(Handle::joined(workflow_id, join))
    }

    async fn wake_up(&self, _env: &Env, workflow_id: Uuid) -> Result<(), Error> {
        debug!(%workflow_id, "waking spawned workflow");
        wake_flag(&self.wakes, workflow_id).notify_one();
        Ok(())
    }
}

/// Sleeps through timers; parks on the shared wake flag for signal waits
pub struct SpawnExecutor {
    wakes: Arc<WakeSet>,
}

#[async_trait]
impl Executor for SpawnExecutor {
    async fn suspend_until(&self, workflow_id: Uuid, at: DateTime<Utc>) -> Result<(), Error> {
        DirectExecutor.suspend_until(workflow_id, at).await
    }

    async fn suspend(&self, workflow_id: Uuid) -> Result<(), Error> {
        let notify = wake_flag(&self.wakes, workflow_id);
        debug!(%workflow_id, "parked on wake flag");
        notify.notified().await;
        Ok(())
    }
}
