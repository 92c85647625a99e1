//! # Lightemporal
//!
//! A lightweight durable-execution engine: write long-running, resumable
//! workflows made of individually replayable activity steps. Every
//! completed step is persisted, so a crash, restart or deliberate
//! suspension replays only the work that has not yet produced a durable
//! result. Signals and timers let workflows wait on external events or
//! wall-clock delays across process lifetimes.
//!
//! ## Features
//!
//! - **Memoized replay**: activity results are cached per
//!   `(workflow, step ordinal, input)` and served on re-runs
//! - **Signals**: named messages bound to waits in FIFO order
//! - **Durable timers**: `sleep` survives crashes without resetting
//! - **Durable task queue**: earliest-ready-first claims, retries with
//!   backoff, suspend/wake-up, typed result slots
//! - **Pluggable execution**: inline, task-per-workflow, or worker-pool
//!   runners selected through the environment
//! - **Two store backends**: embedded SQLite and a file-backed JSON
//!   document store, used interchangeably
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 Workflow / Activity engine                  │
//! │   (step ordinals, replay cache, sleep, wait, signal)       │
//! └────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │    Runners / Executors    │   │          TaskQueue           │
//! │ (direct, spawn, queued)  │   │ (claim, retry, suspend, ...) │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Store (trait)                           │
//! │        SqliteStore            DocumentStore                 │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lightemporal::prelude::*;
//!
//! let format = Activity::new("format", |name: String| async move {
//!     Ok(format!("hi {name}"))
//! });
//!
//! let greet = Workflow::new("greet", {
//!     let format = format.clone();
//!     move |wf: WorkflowCtx, name: String| {
//!         let format = format.clone();
//!         async move { wf.activity(&format, name).await }
//!     }
//! });
//!
//! let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("lightemporal.db").await?);
//! let env = Env::new(store);
//!
//! let greeting = greet.run(&env, "world".to_string()).await?;
//! assert_eq!(greeting, "hi world");
//! ```

pub mod codec;
pub mod env;
pub mod error;
pub mod persistence;
pub mod queue;
pub mod registry;
pub mod repos;
pub mod runner;
pub mod worker;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::codec::{Codec, Json};
    pub use crate::env::Env;
    pub use crate::error::Error;
    pub use crate::persistence::{DocumentStore, SqliteStore, Store, StoreError};
    pub use crate::queue::{TaskCall, TaskQueue};
    pub use crate::registry::Registry;
    pub use crate::runner::{
        DirectRunner, Executor, Handle, QueueRunner, Runner, SpawnRunner,
    };
    pub use crate::worker::{RetryPolicy, Worker, WorkerConfig};
    pub use crate::workflow::{
        send_signal, Activity, Signal, Workflow, WorkflowCtx, WorkflowHandle,
    };
}

// Re-export key types at crate root
pub use codec::{Codec, CodecError, Json};
pub use env::Env;
pub use error::Error;
pub use persistence::{
    DocumentStore, SqliteStore, Store, StoreError, TaskStatus, WorkflowStatus,
};
pub use queue::{TaskCall, TaskQueue};
pub use registry::{Registry, TaskHandler};
pub use repos::{ActivityRepo, SignalRepo, TaskRepo, WorkflowRepo};
pub use runner::{
    DirectExecutor, DirectRunner, Executor, Handle, QueueExecutor, QueueRunner, Runner,
    SpawnExecutor, SpawnRunner,
};
pub use worker::{RetryPolicy, Worker, WorkerConfig};
pub use workflow::{send_signal, Activity, Signal, Workflow, WorkflowCtx, WorkflowHandle};
