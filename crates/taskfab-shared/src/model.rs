//! Function and task records (the persisted data model).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered callable. `payload` is the function registry key, not the
/// callable's code: see `registry::FunctionRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub function_id: String,
    pub name: String,
    pub payload: String,
}

impl FunctionRecord {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            function_id: Uuid::now_v7().to_string(),
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Lifecycle state of a task. Transitions only move forward:
/// `Queued -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single execution request and its outcome.
///
/// `payload` carries the serialized `(args, kwargs)` pair the function is
/// invoked with; `result` is empty until the task reaches a terminal state,
/// at which point it is written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub function_id: String,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl TaskRecord {
    pub fn new(function_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_id: Uuid::now_v7().to_string(),
            function_id: function_id.into(),
            payload,
            status: TaskStatus::Queued,
            result: serde_json::Value::Null,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.result = result;
    }

    pub fn mark_failed(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Failed;
        self.result = result;
    }
}
