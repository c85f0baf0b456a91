//! Task Tracker: an ephemeral in-memory task map, mirrored to durable file
//! records so clients can poll a background task (upload, repo analysis)
//! by UUID even across a process restart's worth of file-record history.

use crate::error::{PipelineError, Result};
use crate::workspace::ProjectWorkspace;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Error,
}

/// Ephemeral state for one background task, keyed by task-id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub message: String,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskState {
    pub fn pending(message: impl Into<String>, timestamp: f64) -> Self {
        Self { status: TaskStatus::Pending, message: message.into(), timestamp, result: None }
    }
}

/// In-memory map of live task state. File-record mirroring (for durability
/// across a file's lifecycle) is the caller's responsibility, driven
/// through [`TaskTracker::mirror_to_file_record`].
#[derive(Default)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<String, TaskState>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, task_id: impl Into<String>, message: impl Into<String>, timestamp: f64) {
        self.tasks.write().insert(task_id.into(), TaskState::pending(message, timestamp));
    }

    pub fn transition(&self, task_id: &str, status: TaskStatus, message: impl Into<String>, timestamp: f64) {
        let mut tasks = self.tasks.write();
        let entry = tasks.entry(task_id.to_string()).or_insert_with(|| TaskState::pending("", timestamp));
        entry.status = status;
        entry.message = message.into();
        entry.timestamp = timestamp;
    }

    pub fn complete(&self, task_id: &str, result: serde_json::Value, timestamp: f64) {
        let mut tasks = self.tasks.write();
        let entry = tasks.entry(task_id.to_string()).or_insert_with(|| TaskState::pending("", timestamp));
        entry.status = TaskStatus::Success;
        entry.timestamp = timestamp;
        entry.result = Some(result);
    }

    pub fn get(&self, task_id: &str) -> Result<TaskState> {
        self.tasks.read().get(task_id).cloned().ok_or_else(|| PipelineError::NotFound(format!("task '{}'", task_id)))
    }

    /// Mirror this task's current state onto `file_id`'s durable record, so
    /// the status survives whatever dropped the in-memory map.
    pub fn mirror_to_file_record(&self, workspace: &ProjectWorkspace, file_id: &str, task_id: &str) -> Result<()> {
        let state = self.get(task_id)?;
        let mut files = workspace.load_files()?;
        if let Some(record) = files.iter_mut().find(|f| f.id == file_id) {
            record.message = state.message;
            record.status = match state.status {
                TaskStatus::Pending => crate::workspace::FileStatus::Pending,
                TaskStatus::Processing => crate::workspace::FileStatus::Processing,
                TaskStatus::Success => crate::workspace::FileStatus::Success,
                TaskStatus::Error => crate::workspace::FileStatus::Error,
            };
        }
        workspace.save_files(&files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_get_is_pending() {
        let tracker = TaskTracker::new();
        tracker.start("task-1", "queued", 0.0);
        let state = tracker.get("task-1").unwrap();
        assert_eq!(state.status, TaskStatus::Pending);
    }

    #[test]
    fn test_transition_to_processing_then_success() {
        let tracker = TaskTracker::new();
        tracker.start("task-1", "queued", 0.0);
        tracker.transition("task-1", TaskStatus::Processing, "working", 1.0);
        tracker.complete("task-1", serde_json::json!({"code": "ok"}), 2.0);

        let state = tracker.get("task-1").unwrap();
        assert_eq!(state.status, TaskStatus::Success);
        assert!(state.result.is_some());
    }

    #[test]
    fn test_get_missing_task_errors() {
        let tracker = TaskTracker::new();
        let err = tracker.get("nope").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
