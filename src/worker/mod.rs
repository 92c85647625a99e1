//! Worker poll loop
//!
//! A worker repeatedly claims the next ready task, resolves its handler
//! through the registry and dispatches on the outcome: success records
//! the result, the suspension signal becomes a queue mutation (reschedule
//! at a deadline, or park until wake-up), and other failures climb the
//! retry ladder until the error lands in the task's result slot.
//!
//! Inside the worker layer the queue executor and the inline runner are
//! installed, so workflow bodies raise suspensions as control flow and
//! nested workflow calls run on the worker itself.

mod retry;

pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::env::Env;
use crate::error::Error;
use crate::persistence::TaskRecord;
use crate::registry::Registry;
use crate::repos::TaskRepo;
use crate::runner::{DirectRunner, QueueExecutor};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Retry ladder for failed tasks
    pub retry: RetryPolicy,

    /// When set, Running tasks claimed longer ago than this are swept
    /// back to Scheduled (crash recovery)
    pub stale_after: Option<Duration>,

    /// How often the stale sweep runs
    pub stale_sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stale_after: None,
            stale_sweep_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    pub fn with_stale_sweep_interval(mut self, interval: Duration) -> Self {
        self.stale_sweep_interval = interval;
        self
    }
}

/// Polls one queue and executes registered tasks
pub struct Worker {
    env: Env,
    registry: Arc<Registry>,
    config: WorkerConfig,
}

impl Worker {
    /// Build a worker over an environment; the worker's own layer swaps
    /// in the queue executor and the inline runner
    pub fn new(env: &Env, registry: Arc<Registry>) -> Self {
        let env = env
            .clone()
            .with_runner(Arc::new(DirectRunner))
            .with_executor(Arc::new(QueueExecutor));
        Self {
            env,
            registry,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// The worker's environment layer
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Poll and execute tasks until the surrounding task is cancelled or
    /// the store fails
    pub async fn run(&self) -> Result<(), Error> {
        let mut last_sweep = Instant::now();
        loop {
            self.maybe_sweep(&mut last_sweep).await?;
            match self.env.queue().try_get_next_task().await? {
                Some(task) => self.handle(task).await?,
                None => tokio::time::sleep(self.env.queue().poll_interval()).await,
            }
        }
    }

    /// Claim one task (blocking) and execute it; test-friendly single
    /// iteration of the loop
    pub async fn process_next(&self) -> Result<(), Error> {
        let task = self.env.queue().get_next_task().await?;
        self.handle(task).await
    }

    async fn maybe_sweep(&self, last_sweep: &mut Instant) -> Result<(), Error> {
        let Some(threshold) = self.config.stale_after else {
            return Ok(());
        };
        if last_sweep.elapsed() < self.config.stale_sweep_interval {
            return Ok(());
        }
        let swept = TaskRepo::new(self.env.store().clone())
            .requeue_stale(self.env.queue().queue_id(), threshold)
            .await?;
        if swept > 0 {
            info!(count = swept, "requeued stale tasks");
        }
        *last_sweep = Instant::now();
        Ok(())
    }

    #[instrument(skip(self, task), fields(task = %task.name, task_id = %task.id))]
    async fn handle(&self, task: TaskRecord) -> Result<(), Error> {
        let Some(handler) = self.registry.resolve(&task.name) else {
            warn!(task = %task.name, "no handler registered");
            let err = Error::UnknownTask(task.name.clone());
            return self.env.queue().set_error(task.id, err.to_string()).await;
        };

        info!(task = %task.name, retry_count = task.retry_count, "task started");

        match handler.call(&self.env, &task.input).await {
            Ok(output) => {
                info!(task = %task.name, "task completed");
                self.env.queue().set_result(task.id, output).await
            }
            Err(Error::Suspended {
                resume_at: Some(at),
            }) => {
                info!(task = %task.name, resume_at = %at, "task rescheduled for deadline");
                self.env.queue().requeue(&task.later(at)).await
            }
            Err(Error::Suspended { resume_at: None }) => {
                info!(task = %task.name, "task suspended until wake-up");
                self.env.queue().suspend(&task).await?;
                Ok(())
            }
            Err(err) => {
                warn!(task = %task.name, error = %err, "task failed");
                if self.config.retry.should_retry(task.retry_count) {
                    let delay = self.config.retry.delay_for_retry(task.retry_count);
                    info!(task = %task.name, delay_ms = delay.as_millis() as u64, "retrying");
                    self.env.queue().requeue(&task.retry(delay)).await
                } else {
                    self.env.queue().set_error(task.id, err.to_string()).await
                }
            }
        }
    }
}
