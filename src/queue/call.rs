//! Binding of a named function invocation to a queue task

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::codec::CodecError;
use crate::error::Error;
use crate::persistence::{TaskRecord, TaskStatus};

/// A task-name plus encoded input, ready to be enqueued.
///
/// The name must match a handler registered on the worker's
/// [`Registry`](crate::registry::Registry); the input is whatever that
/// handler's codec expects.
#[derive(Debug, Clone)]
pub struct TaskCall {
    name: String,
    input: String,
    workflow_id: Option<Uuid>,
}

impl TaskCall {
    /// Bind a pre-encoded input payload to a task name
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            workflow_id: None,
        }
    }

    /// Bind a serializable input to a task name through the JSON codec
    pub fn encode<I: Serialize>(name: impl Into<String>, input: &I) -> Result<Self, Error> {
        let raw = serde_json::to_string(input).map_err(CodecError::from)?;
        Ok(Self::new(name, raw))
    }

    /// Tag the resulting task with its workflow, so a wake-up can find it
    pub fn for_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Materialize a fresh Scheduled task row for this call
    pub fn to_task(&self, queue_id: &str, at: DateTime<Utc>) -> TaskRecord {
        TaskRecord {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            timestamp: at,
            retry_count: 0,
            input: self.input.clone(),
            queue_id: queue_id.to_string(),
            status: TaskStatus::Scheduled,
            workflow_id: self.workflow_id,
            claimed_at: None,
        }
    }
}
