pub mod error;
pub mod orchestrator;
pub mod tasks;
pub mod validator;
pub mod workspace;

pub use error::{PipelineError, Result};
pub use orchestrator::{LoopOutcome, PipelineOrchestrator};
pub use tasks::{TaskState, TaskStatus, TaskTracker};
pub use validator::{RemoteValidator, ValidationOutcome, Validator};
pub use workspace::{FileRecord, FileStatus, ProjectWorkspace};

/// Current time as a Unix timestamp — the unit `FileRecord`/`TaskState`
/// timestamps are stored in throughout this crate.
pub fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
