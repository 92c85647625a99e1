//! Task registry
//!
//! Workers resolve a claimed task's name to a handler through a registry
//! built at process start. Plain functions register under an explicit
//! task name; a workflow registers its create and run handlers under
//! `<name>.create` / `<name>.run`, which is how queued workflow
//! executions find their way back to user code in another process.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::codec::CodecError;
use crate::env::Env;
use crate::error::Error;
use crate::runner::{create_task_name, run_task_name};
use crate::workflow::{AnyWorkflow, Workflow};

/// Type-erased task body executed by the worker loop
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn call(&self, env: &Env, raw_input: &str) -> Result<String, Error>;
}

/// Task-name to handler mapping
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain function under a stable task name
    pub fn task<I, O, F, Fut>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, Error>> + Send + 'static,
    {
        let erased: Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync> =
            Arc::new(move |input| Box::pin(body(input)));
        self.handlers
            .insert(name.into(), Arc::new(FnHandler { body: erased }));
        self
    }

    /// Register a workflow's create and run handlers
    pub fn workflow<I, O>(&mut self, workflow: &Workflow<I, O>) -> &mut Self
    where
        I: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        let erased = workflow.erased();
        self.handlers.insert(
            create_task_name(workflow.name()),
            Arc::new(CreateHandler {
                workflow: erased.clone(),
            }),
        );
        self.handlers.insert(
            run_task_name(workflow.name()),
            Arc::new(RunHandler { workflow: erased }),
        );
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct FnHandler<I, O> {
    body: Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync>,
}

#[async_trait]
impl<I, O> TaskHandler for FnHandler<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    async fn call(&self, _env: &Env, raw_input: &str) -> Result<String, Error> {
        let input: I = serde_json::from_str(raw_input).map_err(CodecError::from)?;
        let output = (self.body)(input).await?;
        Ok(serde_json::to_string(&output).map_err(CodecError::from)?)
    }
}

struct CreateHandler {
    workflow: Arc<dyn AnyWorkflow>,
}

#[async_trait]
impl TaskHandler for CreateHandler {
    async fn call(&self, env: &Env, raw_input: &str) -> Result<String, Error> {
        let workflow_id = self.workflow.create_raw(env, raw_input).await?;
        Ok(serde_json::to_string(&workflow_id).map_err(CodecError::from)?)
    }
}

struct RunHandler {
    workflow: Arc<dyn AnyWorkflow>,
}

#[async_trait]
impl TaskHandler for RunHandler {
    async fn call(&self, env: &Env, raw_input: &str) -> Result<String, Error> {
        let workflow_id: Uuid = serde_json::from_str(raw_input).map_err(CodecError::from)?;
        self.workflow.resume_raw(env, workflow_id).await
    }
}
