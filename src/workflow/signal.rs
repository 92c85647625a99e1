//! Workflow signals
//!
//! A signal is a named, serializable message delivered to a workflow.
//! Emission writes a durable row with no step binding; the k-th matching
//! `wait` call of the receiving workflow binds and consumes it, oldest
//! first.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::codec::CodecError;
use crate::env::Env;
use crate::error::Error;
use crate::persistence::SignalRecord;
use crate::repos::SignalRepo;

/// A named signal payload.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct RefundApproved {
///     approver: String,
/// }
///
/// impl Signal for RefundApproved {
///     const NAME: &'static str = "refund_approved";
/// }
/// ```
pub trait Signal: Serialize + DeserializeOwned + Send + 'static {
    /// Stable name matching emitters to waiting workflows
    const NAME: &'static str;
}

/// Deliver a signal to a workflow and wake it if it is parked.
///
/// The wake-up goes through the active runner: a no-op inline, a task
/// notification in spawn mode, a queue wake-up in worker mode.
pub async fn send_signal<S: Signal>(
    env: &Env,
    workflow_id: Uuid,
    signal: &S,
) -> Result<(), Error> {
    let content = serde_json::to_string(signal).map_err(CodecError::from)?;
    let record = SignalRecord::new(workflow_id, S::NAME, content);

    SignalRepo::new(env.store().clone()).insert(&record).await?;
    tracing::debug!(%workflow_id, signal = S::NAME, "emitted signal");

    env.runner().wake_up(env, workflow_id).await
}
