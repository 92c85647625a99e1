//! Crate-level error type
//!
//! Store and codec failures are wrapped; the remaining variants are the
//! engine's own error kinds. `Suspended` is not a failure: it is the
//! control-flow signal a queue-backed executor uses to hand a parked
//! workflow back to the worker loop.

use chrono::{DateTime, Utc};

use crate::codec::CodecError;
use crate::persistence::StoreError;

/// Errors surfaced by the engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Persistence failure (includes not-found and already-running kinds)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payload (de)serialization failure
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Non-blocking result fetch found no result row
    #[error("no result available")]
    Empty,

    /// Workflow execution is parked; resume at the given instant, or on
    /// an explicit wake-up when `resume_at` is `None`
    #[error("suspended")]
    Suspended {
        resume_at: Option<DateTime<Utc>>,
    },

    /// Operation not provided by the active runner or executor
    #[error("{0} is not supported by the active runner")]
    Unsupported(&'static str),

    /// Failure raised by a user workflow, activity, or task body
    #[error("{0}")]
    Failure(String),

    /// No handler registered under this task name
    #[error("unknown task name: {0}")]
    UnknownTask(String),
}

impl Error {
    /// Build a user-level failure from any displayable message
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Whether this is a duplicate-active-workflow rejection
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::Store(StoreError::AlreadyRunning { .. }))
    }
}
