//! Inline execution
//!
//! The direct runner drives the workflow on the caller, which makes it
//! deterministic and single-threaded. There is no concurrent party to
//! start or wake, so `start` is unsupported, signal suspension is
//! unsupported, and a wake-up has nothing to do (pending signals are
//! found synchronously by the next wait).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Executor, Handle, Runner};
use crate::env::Env;
use crate::error::Error;
use crate::workflow::AnyWorkflow;

/// Runs workflows inline on the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRunner;

#[async_trait]
impl Runner for DirectRunner {
    async fn run(
        &self,
        env: &Env,
        workflow: Arc<dyn AnyWorkflow>,
        raw_input: String,
    ) -> Result<String, Error> {
        let workflow_id = workflow.create_raw(env, &raw_input).await?;
        workflow.resume_raw(env, workflow_id).await
    }

    async fn start(
        &self,
        _env: &Env,
        _workflow: Arc<dyn AnyWorkflow>,
        _raw_input: String,
    ) -> Result<Handle, Error> {
        Err(Error::Unsupported("start"))
    }

    async fn wake_up(&self, _env: &Env, _workflow_id: Uuid) -> Result<(), Error> {
        // Nothing is parked in inline mode
        Ok(())
    }
}

/// Sleeps the caller through timer suspensions
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

#[async_trait]
impl Executor for DirectExecutor {
    async fn suspend_until(&self, _workflow_id: Uuid, at: DateTime<Utc>) -> Result<(), Error> {
        let now = Utc::now();
        if at > now {
            tokio::time::sleep((at - now).to_std().unwrap_or_default()).await;
        }
        Ok(())
    }

    async fn suspend(&self, _workflow_id: Uuid) -> Result<(), Error> {
        // No one can wake an inline workflow
        Err(Error::Unsupported("suspend"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_suspend_until_sleeps_to_target() {
        let started = Instant::now();
        DirectExecutor
            .suspend_until(Uuid::new_v4(), Utc::now() + chrono::Duration::milliseconds(50))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_suspend_until_past_target_returns_immediately() {
        let started = Instant::now();
        DirectExecutor
            .suspend_until(Uuid::new_v4(), Utc::now() - chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_suspend_is_unsupported() {
        let result = DirectExecutor.suspend(Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::Unsupported("suspend"))));
    }
}
