//! Project Workspace: a named directory holding `uploads/`, `graph_db/`,
//! `history.json`, and `files.json`.
//!
//! Grounded on `original_source/backend/project_manager.py`'s per-project
//! layout and the teacher's `aco::workspace::initializer::WorkspaceInitializer`
//! create-if-missing / validate-permissions shape (adapted from acolib's
//! generic security-sandboxed workspace to this pipeline's fixed
//! four-entry layout).

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of an uploaded file within a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Uploaded,
    Processing,
    Success,
    Indexed,
    Error,
}

/// Durable per-file bookkeeping, mirrored to `files.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub status: FileStatus,
    pub message: String,
    pub timestamp: f64,
    pub location: PathBuf,
    /// Unix timestamp of the last successful graph-sync for this file.
    /// `last_graph_sync >= file mtime` means the file's current content is
    /// already reflected in the graph.
    pub last_graph_sync: f64,
    pub size: u64,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, location: PathBuf, size: u64, timestamp: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            status: FileStatus::Pending,
            message: String::new(),
            timestamp,
            location,
            last_graph_sync: 0.0,
            size,
        }
    }

    /// Whether this file needs to be (re-)ingested into the graph, given
    /// its filesystem mtime.
    pub fn is_stale(&self, mtime: f64) -> bool {
        mtime > self.last_graph_sync
    }
}

/// A named project directory: `<root>/<name>/{uploads,graph_db,history.json,files.json}`.
pub struct ProjectWorkspace {
    pub name: String,
    pub root: PathBuf,
}

impl ProjectWorkspace {
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn graph_db_dir(&self) -> PathBuf {
        self.root.join("graph_db")
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join("history.json")
    }

    pub fn files_path(&self) -> PathBuf {
        self.root.join("files.json")
    }

    /// Create a fresh workspace under `projects_root/name`. Fails with
    /// [`PipelineError::Conflict`] if it already exists, or
    /// [`PipelineError::InputInvalid`] if `name` contains characters
    /// outside `[A-Za-z0-9_-]+`.
    pub fn create(projects_root: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        let root = projects_root.join(name);
        if root.exists() {
            return Err(PipelineError::Conflict(format!("workspace '{}' already exists", name)));
        }

        let workspace = Self { name: name.to_string(), root };
        std::fs::create_dir_all(&workspace.uploads_dir())?;
        std::fs::create_dir_all(&workspace.graph_db_dir())?;
        std::fs::write(workspace.history_path(), "[]")?;
        std::fs::write(workspace.files_path(), "[]")?;
        Ok(workspace)
    }

    /// Bind to an existing workspace directory without creating anything.
    pub fn open(projects_root: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        let root = projects_root.join(name);
        if !root.exists() {
            return Err(PipelineError::NotFound(format!("workspace '{}' does not exist", name)));
        }
        Ok(Self { name: name.to_string(), root })
    }

    pub fn load_files(&self) -> Result<Vec<FileRecord>> {
        let text = std::fs::read_to_string(self.files_path())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_files(&self, files: &[FileRecord]) -> Result<()> {
        std::fs::write(self.files_path(), serde_json::to_string_pretty(files)?)?;
        Ok(())
    }

    /// Upsert a single file record by id (O(N), acceptable at human-scale
    /// file counts).
    pub fn upsert_file_record(&self, record: FileRecord) -> Result<()> {
        let mut files = self.load_files()?;
        match files.iter_mut().find(|f| f.id == record.id) {
            Some(existing) => *existing = record,
            None => files.push(record),
        }
        self.save_files(&files)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let is_legal = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !is_legal {
        return Err(PipelineError::InputInvalid(format!("workspace name '{}' must match [A-Za-z0-9_-]+", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("pipeline-workspace-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_create_rejects_illegal_name() {
        let root = temp_root();
        let err = ProjectWorkspace::create(&root, "bad name!").unwrap_err();
        assert!(matches!(err, PipelineError::InputInvalid(_)));
    }

    #[test]
    fn test_create_lays_out_fixed_directories() {
        let root = temp_root();
        let workspace = ProjectWorkspace::create(&root, "demo-project").unwrap();

        assert!(workspace.uploads_dir().is_dir());
        assert!(workspace.graph_db_dir().is_dir());
        assert!(workspace.history_path().is_file());
        assert!(workspace.files_path().is_file());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_create_twice_conflicts() {
        let root = temp_root();
        ProjectWorkspace::create(&root, "demo").unwrap();
        let err = ProjectWorkspace::create(&root, "demo").unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_file_record_is_stale_compares_mtime_to_last_sync() {
        let record = FileRecord::new("doc.md", PathBuf::from("doc.md"), 100, 0.0);
        assert!(record.is_stale(10.0));

        let mut synced = record;
        synced.last_graph_sync = 20.0;
        assert!(!synced.is_stale(10.0));
    }

    #[test]
    fn test_upsert_file_record_round_trip() {
        let root = temp_root();
        let workspace = ProjectWorkspace::create(&root, "demo").unwrap();
        let record = FileRecord::new("doc.md", PathBuf::from("doc.md"), 100, 0.0);
        let id = record.id.clone();

        workspace.upsert_file_record(record).unwrap();
        let files = workspace.load_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, id);

        std::fs::remove_dir_all(&root).ok();
    }
}
