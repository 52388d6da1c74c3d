//! Lifecycle notifications broadcast by the parser pool.
//!
//! Events are advisory. A subscriber that lags behind loses the oldest
//! events; task outcomes are always delivered through the task handle.

use crate::pool::task::{FailureKind, TaskId};
use serde::Serialize;
use std::fmt;

/// Stage of the parse pipeline a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    /// 0-33%
    Parsing,
    /// 33-90%
    Mapping,
    /// 90-100%
    Processing,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Parsing => "parsing",
            ProgressStage::Mapping => "mapping",
            ProgressStage::Processing => "processing",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    TaskStarted {
        task_id: TaskId,
        file_name: String,
        file_size: u64,
    },
    TaskProgress {
        task_id: TaskId,
        file_name: String,
        percent: u8,
        stage: ProgressStage,
    },
    TaskCompleted {
        task_id: TaskId,
        snapshot_id: String,
        file_name: String,
        series_count: usize,
    },
    TaskFailed {
        task_id: TaskId,
        file_name: String,
        kind: FailureKind,
        message: String,
    },
    TaskCanceled {
        task_id: TaskId,
        file_name: String,
    },
}

impl PoolEvent {
    /// Task the event refers to
    pub fn task_id(&self) -> &TaskId {
        match self {
            PoolEvent::TaskStarted { task_id, .. }
            | PoolEvent::TaskProgress { task_id, .. }
            | PoolEvent::TaskCompleted { task_id, .. }
            | PoolEvent::TaskFailed { task_id, .. }
            | PoolEvent::TaskCanceled { task_id, .. } => task_id,
        }
    }

    /// True for completed, failed and canceled events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PoolEvent::TaskCompleted { .. }
                | PoolEvent::TaskFailed { .. }
                | PoolEvent::TaskCanceled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = PoolEvent::TaskProgress {
            task_id: TaskId::from("t-1"),
            file_name: "metrics.json".to_string(),
            percent: 33,
            stage: ProgressStage::Parsing,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_progress");
        assert_eq!(json["task_id"], "t-1");
        assert_eq!(json["stage"], "parsing");
        assert_eq!(json["percent"], 33);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_stage_order() {
        assert!(ProgressStage::Parsing < ProgressStage::Mapping);
        assert!(ProgressStage::Mapping < ProgressStage::Processing);
        assert_eq!(ProgressStage::Mapping.to_string(), "mapping");
    }
}
