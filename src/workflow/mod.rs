//! Workflow engine
//!
//! The deterministic replay protocol. A workflow is a named user function
//! receiving a [`WorkflowCtx`] and its decoded input; every activity call,
//! signal wait and sleep inside the body consumes one step ordinal, and
//! the store's replay cache is the authoritative record of that ordering.
//! Re-running a workflow (after a crash, a failure, or a suspension)
//! replays the body from the top and serves completed steps from the
//! cache, so only unfinished work executes again.
//!
//! The determinism contract is the author's: for a given `(name, input)`
//! the body must issue the same steps in the same order on every run.

mod activity;
mod signal;

pub use activity::Activity;
pub use signal::{send_signal, Signal};

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::codec::{Codec, CodecError, Json};
use crate::env::Env;
use crate::error::Error;
use crate::persistence::ActivityRecord;
use crate::repos::{ActivityRepo, SignalRepo, WorkflowRepo};
use crate::runner::Handle;

/// Execution context of one running workflow: its identity plus the
/// monotone step counter that keys the replay cache.
///
/// The context is handed to the workflow body and passed to every engine
/// primitive, so a step can only ever be issued from inside a workflow.
#[derive(Clone)]
pub struct WorkflowCtx {
    workflow_id: Uuid,
    step: Arc<AtomicU32>,
    env: Env,
}

impl WorkflowCtx {
    pub(crate) fn new(workflow_id: Uuid, env: Env) -> Self {
        Self {
            workflow_id,
            step: Arc::new(AtomicU32::new(0)),
            env,
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    fn next_step(&self) -> u32 {
        self.step.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run one activity step.
    ///
    /// The step ordinal is bumped, the cache is consulted under
    /// `(workflow, name#ordinal, input)`, and the body only runs on a
    /// miss. Results are persisted before they are returned; failures
    /// leave no cache entry.
    pub async fn activity<I, O>(&self, activity: &Activity<I, O>, input: I) -> Result<O, Error>
    where
        I: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        let step = self.next_step();
        let name = format!("{}#{}", activity.name(), step);
        let raw_input = activity.codec().dump_input(&input)?;
        let repo = ActivityRepo::new(self.env.store().clone());

        if let Some(cached) = repo
            .may_find_one(self.workflow_id, &name, &raw_input)
            .await?
        {
            debug!(workflow_id = %self.workflow_id, activity = %name, "replayed cached result");
            return Ok(activity.codec().load_output(&cached.output)?);
        }

        let output = activity.invoke(input).await?;
        let raw_output = activity.codec().dump_output(&output)?;
        repo.save(&ActivityRecord::new(
            self.workflow_id,
            name.clone(),
            raw_input,
            raw_output,
        ))
        .await?;
        debug!(workflow_id = %self.workflow_id, activity = %name, "persisted activity result");
        Ok(output)
    }

    /// Memoized internal step sharing the activity cache protocol
    async fn memo_step<O, F, Fut>(
        &self,
        user_name: &str,
        raw_input: String,
        run: F,
    ) -> Result<O, Error>
    where
        O: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<O, Error>>,
    {
        let step = self.next_step();
        let name = format!("{user_name}#{step}");
        let repo = ActivityRepo::new(self.env.store().clone());

        if let Some(cached) = repo
            .may_find_one(self.workflow_id, &name, &raw_input)
            .await?
        {
            return Ok(serde_json::from_str(&cached.output).map_err(CodecError::from)?);
        }

        let output = run().await?;
        let raw_output = serde_json::to_string(&output).map_err(CodecError::from)?;
        repo.save(&ActivityRecord::new(
            self.workflow_id,
            name,
            raw_input,
            raw_output,
        ))
        .await?;
        Ok(output)
    }

    /// Durable sleep.
    ///
    /// Two memoized steps: the target instant (computed once, so a crash
    /// or replay never resets the clock) and the suspension up to it.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Error> {
        let raw_duration =
            serde_json::to_string(&duration.as_secs_f64()).map_err(CodecError::from)?;
        let target: DateTime<Utc> = self
            .memo_step("timestamp_for_duration", raw_duration, || async move {
                Ok(Utc::now() + chrono::Duration::milliseconds(duration.as_millis() as i64))
            })
            .await?;

        let raw_target = serde_json::to_string(&target).map_err(CodecError::from)?;
        let env = self.env.clone();
        let workflow_id = self.workflow_id;
        self.memo_step("sleep_until", raw_target, move || async move {
            if target > Utc::now() {
                env.executor().suspend_until(workflow_id, target).await?;
            }
            Ok(())
        })
        .await
    }

    /// Wait for the next matching signal.
    ///
    /// The wait consumes one step ordinal; the repository either returns
    /// the signal already bound to that ordinal (replay) or binds the
    /// oldest unbound one. With nothing to consume, the executor parks
    /// the workflow until a wake-up and the lookup retries.
    pub async fn wait<S: Signal>(&self) -> Result<S, Error> {
        let step = self.next_step();
        let repo = SignalRepo::new(self.env.store().clone());

        loop {
            if let Some(record) = repo
                .may_find_one(self.workflow_id, S::NAME, step)
                .await?
            {
                debug!(workflow_id = %self.workflow_id, signal = S::NAME, step, "consumed signal");
                return Ok(serde_json::from_str(&record.content).map_err(CodecError::from)?);
            }
            self.env.executor().suspend(self.workflow_id).await?;
        }
    }

    /// Emit a signal to another workflow
    pub async fn signal<S: Signal>(&self, workflow_id: Uuid, signal: &S) -> Result<(), Error> {
        send_signal(&self.env, workflow_id, signal).await
    }
}

type WorkflowBody<I, O> =
    Arc<dyn Fn(WorkflowCtx, I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync>;

/// A user function promoted into a durable, replayable workflow
pub struct Workflow<I, O> {
    name: String,
    codec: Arc<dyn Codec<I, O>>,
    body: WorkflowBody<I, O>,
}

impl<I, O> Clone for Workflow<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            codec: self.codec.clone(),
            body: self.body.clone(),
        }
    }
}

impl<I, O> Workflow<I, O>
where
    I: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
{
    /// Promote a function under a stable workflow name
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(WorkflowCtx, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, Error>> + Send + 'static,
    {
        let body: WorkflowBody<I, O> = Arc::new(move |ctx, input| Box::pin(body(ctx, input)));
        Self {
            name: name.into(),
            codec: Arc::new(Json),
            body,
        }
    }

    /// Swap the payload codec
    pub fn with_codec(mut self, codec: Arc<dyn Codec<I, O>>) -> Self {
        self.codec = codec;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtain (or revive) the workflow row for this input and return its
    /// id; the row is Running on return
    pub async fn create(&self, env: &Env, input: &I) -> Result<Uuid, Error> {
        let raw_input = self.codec.dump_input(input)?;
        self.create_inner(env, &raw_input).await
    }

    /// Replay the workflow identified by `workflow_id` to a typed result
    pub async fn resume(&self, env: &Env, workflow_id: Uuid) -> Result<O, Error> {
        let raw = self.resume_inner(env, workflow_id).await?;
        Ok(self.codec.load_output(&raw)?)
    }

    /// Run to completion through the active runner
    pub async fn run(&self, env: &Env, input: I) -> Result<O, Error> {
        let raw_input = self.codec.dump_input(&input)?;
        let runner = env.runner().clone();
        let raw = runner.run(env, self.erased(), raw_input).await?;
        Ok(self.codec.load_output(&raw)?)
    }

    /// Start asynchronously through the active runner
    pub async fn start(&self, env: &Env, input: I) -> Result<WorkflowHandle<O>, Error> {
        let raw_input = self.codec.dump_input(&input)?;
        let runner = env.runner().clone();
        let handle = runner.start(env, self.erased(), raw_input).await?;
        let codec = self.codec.clone();
        let decode: Arc<dyn Fn(&str) -> Result<O, Error> + Send + Sync> =
            Arc::new(move |raw| codec.load_output(raw).map_err(Error::from));
        Ok(WorkflowHandle { handle, decode })
    }

    /// Type-erased view used by runners and the registry
    pub(crate) fn erased(&self) -> Arc<dyn AnyWorkflow> {
        Arc::new(self.clone())
    }

    #[instrument(skip(self, env, raw_input), fields(workflow = %self.name))]
    async fn create_inner(&self, env: &Env, raw_input: &str) -> Result<Uuid, Error> {
        let repo = WorkflowRepo::new(env.store().clone());
        let record = repo.get_or_create(&self.name, raw_input).await?;
        info!(workflow = %self.name, workflow_id = %record.id, "workflow running");
        Ok(record.id)
    }

    #[instrument(skip(self, env), fields(workflow = %self.name))]
    async fn resume_inner(&self, env: &Env, workflow_id: Uuid) -> Result<String, Error> {
        let repo = WorkflowRepo::new(env.store().clone());
        let record = repo.get(workflow_id).await?;
        let input = self.codec.load_input(&record.input)?;
        let ctx = WorkflowCtx::new(workflow_id, env.clone());

        match (self.body)(ctx, input).await {
            Ok(output) => {
                repo.complete(&record).await?;
                info!(workflow = %self.name, %workflow_id, "workflow completed");
                Ok(self.codec.dump_output(&output)?)
            }
            // Control flow, not failure: the workflow keeps its Running
            // slot while parked and resumes by replay.
            Err(err @ Error::Suspended { .. }) => Err(err),
            Err(err) => {
                repo.failed(&record).await?;
                warn!(workflow = %self.name, %workflow_id, error = %err, "workflow stopped");
                Err(err)
            }
        }
    }
}

/// Type-erased workflow surface for runners and worker-side handlers
#[async_trait]
pub trait AnyWorkflow: Send + Sync {
    fn name(&self) -> &str;

    /// Obtain the workflow row for an encoded input; returns its id
    async fn create_raw(&self, env: &Env, raw_input: &str) -> Result<Uuid, Error>;

    /// Replay the workflow to its encoded output
    async fn resume_raw(&self, env: &Env, workflow_id: Uuid) -> Result<String, Error>;
}

#[async_trait]
impl<I, O> AnyWorkflow for Workflow<I, O>
where
    I: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_raw(&self, env: &Env, raw_input: &str) -> Result<Uuid, Error> {
        self.create_inner(env, raw_input).await
    }

    async fn resume_raw(&self, env: &Env, workflow_id: Uuid) -> Result<String, Error> {
        self.resume_inner(env, workflow_id).await
    }
}

/// Typed handle on an asynchronously started workflow
pub struct WorkflowHandle<O> {
    handle: Handle,
    decode: Arc<dyn Fn(&str) -> Result<O, Error> + Send + Sync>,
}

impl<O> WorkflowHandle<O> {
    pub fn workflow_id(&self) -> Uuid {
        self.handle.workflow_id()
    }

    /// The backing run task, when the workflow was queued
    pub fn task_id(&self) -> Option<Uuid> {
        self.handle.task_id()
    }

    /// Block until completion and decode the result
    pub async fn result(self) -> Result<O, Error> {
        let raw = self.handle.result().await?;
        (self.decode)(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{DocumentStore, Store, WorkflowStatus};
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;

    fn direct_env() -> (tempfile::TempDir, Env) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(DocumentStore::open(dir.path().join("lightemporal.db")));
        (dir, Env::new(store))
    }

    fn counting_format(calls: Arc<AtomicUsize>) -> Activity<String, String> {
        Activity::new("format", move |name: String| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("hi {name}"))
            }
        })
    }

    fn greet_workflow(format: Activity<String, String>) -> Workflow<String, String> {
        Workflow::new("greet", move |wf: WorkflowCtx, name: String| {
            let format = format.clone();
            async move { wf.activity(&format, name).await }
        })
    }

    #[tokio::test]
    async fn test_activity_body_runs_once_across_runs() {
        let (_dir, env) = direct_env();
        let calls = Arc::new(AtomicUsize::new(0));
        let greet = greet_workflow(counting_format(calls.clone()));

        let first = greet.run(&env, "world".to_string()).await.unwrap();
        assert_eq!(first, "hi world");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Completed workflows get a fresh row, but the cache is per
        // workflow id, so the body runs again for the new row.
        let second = greet.run(&env, "world".to_string()).await.unwrap();
        assert_eq!(second, "hi world");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_replay_serves_cached_steps() {
        let (_dir, env) = direct_env();
        let calls = Arc::new(AtomicUsize::new(0));
        let greet = greet_workflow(counting_format(calls.clone()));

        let id = greet.create(&env, &"world".to_string()).await.unwrap();
        let first = greet.resume(&env, id).await.unwrap();
        assert_eq!(first, "hi world");

        // Replaying the same workflow id returns the memoized output
        // without executing the body again.
        let replayed = greet.resume(&env, id).await.unwrap();
        assert_eq!(replayed, "hi world");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_then_resume_reuses_cache() {
        let (_dir, env) = direct_env();

        let first_calls = Arc::new(AtomicUsize::new(0));
        let flaky_calls = Arc::new(AtomicUsize::new(0));

        let first_step = Activity::new("first_step", {
            let calls = first_calls.clone();
            move |_: ()| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1_i64)
                }
            }
        });
        let flaky_step = Activity::new("flaky_step", {
            let calls = flaky_calls.clone();
            move |_: ()| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::failure("flaky"))
                    } else {
                        Ok(2_i64)
                    }
                }
            }
        });

        let flow = Workflow::new("two_steps", {
            let first_step = first_step.clone();
            let flaky_step = flaky_step.clone();
            move |wf: WorkflowCtx, _: ()| {
                let first_step = first_step.clone();
                let flaky_step = flaky_step.clone();
                async move {
                    let a = wf.activity(&first_step, ()).await?;
                    let b = wf.activity(&flaky_step, ()).await?;
                    Ok(a + b)
                }
            }
        });

        let id = flow.create(&env, &()).await.unwrap();
        let failed = flow.resume(&env, id).await;
        assert!(matches!(failed, Err(Error::Failure(_))));

        let repo = WorkflowRepo::new(env.store().clone());
        assert_eq!(repo.get(id).await.unwrap().status, WorkflowStatus::Stopped);

        // The same id revives; the first step replays from cache and only
        // the failed step re-executes
        let revived = flow.create(&env, &()).await.unwrap();
        assert_eq!(revived, id);

        let total = flow.resume(&env, id).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(flaky_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_running_submission_is_rejected() {
        let (_dir, env) = direct_env();
        let greet = greet_workflow(counting_format(Arc::new(AtomicUsize::new(0))));

        greet.create(&env, &"world".to_string()).await.unwrap();
        let duplicate = greet.create(&env, &"world".to_string()).await;
        assert!(duplicate.is_err_and(|e| e.is_already_running()));
    }

    #[tokio::test]
    async fn test_sleep_memoizes_target_timestamp() {
        let (_dir, env) = direct_env();

        let sleeper = Workflow::new("sleeper", |wf: WorkflowCtx, _: ()| async move {
            wf.sleep(Duration::from_millis(50)).await?;
            Ok(Utc::now())
        });

        let started = Utc::now();
        let id = sleeper.create(&env, &()).await.unwrap();
        let woke = sleeper.resume(&env, id).await.unwrap();
        assert!(woke - started >= chrono::Duration::milliseconds(50));

        // Replay does not sleep again: both steps are cached
        let replay_started = Utc::now();
        sleeper.resume(&env, id).await.unwrap();
        assert!(Utc::now() - replay_started < chrono::Duration::milliseconds(40));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        tag: String,
    }

    impl Signal for Ping {
        const NAME: &'static str = "ping";
    }

    #[tokio::test]
    async fn test_waits_consume_signals_in_emission_order() {
        let (_dir, env) = direct_env();

        let waiter = Workflow::new("waiter", |wf: WorkflowCtx, _: ()| async move {
            let mut tags = Vec::new();
            for _ in 0..3 {
                tags.push(wf.wait::<Ping>().await?.tag);
            }
            Ok(tags)
        });

        let id = waiter.create(&env, &()).await.unwrap();
        for tag in ["a", "b", "c"] {
            send_signal(&env, id, &Ping { tag: tag.to_string() })
                .await
                .unwrap();
        }

        let tags = waiter.resume(&env, id).await.unwrap();
        assert_eq!(tags, vec!["a", "b", "c"]);

        // The bindings are durable: steps 1..3 hold the same payloads
        let signals = SignalRepo::new(env.store().clone());
        for (step, tag) in [(1, "a"), (2, "b"), (3, "c")] {
            let bound = signals.may_find_one(id, "ping", step).await.unwrap().unwrap();
            assert_eq!(bound.content, format!("{{\"tag\":\"{tag}\"}}"));
        }
    }
}
