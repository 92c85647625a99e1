//! Process environment
//!
//! The four collaborator slots the engine reads at runtime: the store
//! (`DB`), the queue (`Q`), the runner (`RUN`) and the executor (`EXEC`).
//! An `Env` is an immutable snapshot; `with_*` produces an overridden
//! layer, and crossing a task boundary is a plain clone into the spawned
//! future, so child executions always see the environment their parent
//! captured at spawn time.

use std::fmt;
use std::sync::Arc;

use crate::persistence::Store;
use crate::queue::TaskQueue;
use crate::runner::{DirectExecutor, DirectRunner, Executor, Runner};

/// Snapshot of the active collaborators
#[derive(Clone)]
pub struct Env {
    store: Arc<dyn Store>,
    queue: Arc<TaskQueue>,
    runner: Arc<dyn Runner>,
    executor: Arc<dyn Executor>,
}

impl Env {
    /// Environment over a store with the default queue and the direct
    /// runner/executor pairing
    pub fn new(store: Arc<dyn Store>) -> Self {
        let queue = Arc::new(TaskQueue::new(store.clone()));
        Self {
            store,
            queue,
            runner: Arc::new(DirectRunner),
            executor: Arc::new(DirectExecutor),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = store;
        self
    }

    pub fn with_queue(mut self, queue: Arc<TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.runner
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("queue_id", &self.queue.queue_id())
            .finish_non_exhaustive()
    }
}
