//! Parse tasks, outcomes and the handle a caller awaits.

use crate::core::{IntellimetricError, ParsedSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Identifier of a dispatched task (random UUID v4 string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh random id
    pub fn generate() -> Self {
        let mut bytes: [u8; 16] = rand::random();
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        let hex = hex::encode(bytes);
        TaskId(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    /// Returns the string representation of the task ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string value
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId(id.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document to parse and map
#[derive(Debug, Clone)]
pub struct ParseTask {
    pub snapshot_id: String,
    pub file_name: String,
    pub raw_text: String,
    pub size_bytes: u64,
}

impl ParseTask {
    /// Creates a task whose size is the byte length of `raw_text`
    pub fn new(
        snapshot_id: impl Into<String>,
        file_name: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        let raw_text = raw_text.into();
        Self {
            snapshot_id: snapshot_id.into(),
            file_name: file_name.into(),
            size_bytes: raw_text.len() as u64,
            raw_text,
        }
    }

    /// Overrides the reported size, e.g. with the on-disk size
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// Why a task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    MalformedInput,
    UnsupportedMetricShape,
    UnitFault,
    PoolTerminated,
}

/// Structured failure delivered instead of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParserFailure {
    pub snapshot_id: String,
    pub file_name: String,
    pub task_id: TaskId,
    pub kind: FailureKind,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for ParserFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file_name, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Terminal result of a task. Exactly one is delivered per task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success(Arc<ParsedSnapshot>),
    Failure(ParserFailure),
    Canceled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskOutcome::Canceled)
    }

    pub fn snapshot(&self) -> Option<&Arc<ParsedSnapshot>> {
        match self {
            TaskOutcome::Success(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ParserFailure> {
        match self {
            TaskOutcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Identity of a task carried through the pipeline
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub snapshot_id: String,
    pub file_name: String,
}

impl TaskContext {
    pub(crate) fn failure(
        &self,
        kind: FailureKind,
        message: impl Into<String>,
        detail: Option<String>,
    ) -> ParserFailure {
        ParserFailure {
            snapshot_id: self.snapshot_id.clone(),
            file_name: self.file_name.clone(),
            task_id: self.task_id.clone(),
            kind,
            message: message.into(),
            detail,
        }
    }

    /// Failure for an error raised while parsing raw text
    pub(crate) fn parse_failure(&self, err: &IntellimetricError) -> ParserFailure {
        let message = match err {
            IntellimetricError::MalformedInput(msg) => format!("JSON parsing failed: {}", msg),
            other => format!("JSON parsing failed: {}", other),
        };
        self.failure(FailureKind::MalformedInput, message, Some(err.category().to_string()))
    }

    /// Failure for an error raised while mapping a parsed document
    pub(crate) fn mapping_failure(&self, err: &IntellimetricError) -> ParserFailure {
        let (kind, detail) = match err {
            IntellimetricError::UnsupportedMetricShape { metric } => {
                (FailureKind::UnsupportedMetricShape, Some(metric.clone()))
            },
            other => (FailureKind::MalformedInput, Some(other.category().to_string())),
        };
        self.failure(kind, format!("OTLP mapping failed: {}", err), detail)
    }

    pub(crate) fn unit_fault(&self, detail: &str) -> ParserFailure {
        self.failure(FailureKind::UnitFault, "Worker crashed", Some(detail.to_string()))
    }

    pub(crate) fn terminated(&self) -> ParserFailure {
        self.failure(FailureKind::PoolTerminated, "Pool terminated", None)
    }
}

/// Caller side of a dispatched task
#[derive(Debug)]
pub struct TaskHandle {
    pub(crate) context: TaskContext,
    pub(crate) receiver: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> &TaskId {
        &self.context.task_id
    }

    pub fn file_name(&self) -> &str {
        &self.context.file_name
    }

    /// Waits for the task's outcome.
    pub async fn outcome(self) -> TaskOutcome {
        let context = self.context;
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Failure(context.terminated()),
        }
    }

    /// Blocking variant of [`TaskHandle::outcome`].
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_outcome(self) -> TaskOutcome {
        let context = self.context;
        match self.receiver.blocking_recv() {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Failure(context.terminated()),
        }
    }

    /// Returns the outcome if it has already been delivered.
    pub fn try_outcome(&mut self) -> Option<TaskOutcome> {
        self.receiver.try_recv().ok()
    }
}
