//! The merged project snapshot and the per-watcher slices it is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::diagnostics::ErrorInfo;
use super::project::{DependencyInfo, DetectedLanguage, ServiceInfo, TodoItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

/// Version-control state of the workspace.
///
/// The zero value describes a directory that is not a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub branch: String,
    pub commit_hash: String,
    pub commit_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_time: Option<DateTime<Utc>>,
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
}

impl GitStatus {
    /// Recomputes `dirty` from the working-tree lists.
    pub fn settle_dirty(&mut self) {
        self.dirty = !self.modified.is_empty() || !self.untracked.is_empty();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub score: u8,
    pub error_count: usize,
    pub warning_count: usize,
    pub debt: DebtLevel,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            score: 100,
            error_count: 0,
            warning_count: 0,
            debt: DebtLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub is_building: bool,
    pub active_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build_time: Option<DateTime<Utc>>,
    pub output_dirs: Vec<String>,
    pub success: bool,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub project_related: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    pub executable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryInfo {
    pub path: String,
    pub file_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStructure {
    pub root: PathBuf,
    pub project_type: String,
    pub main_files: Vec<String>,
    pub config_files: Vec<String>,
    pub files: Vec<FileInfo>,
    pub directories: Vec<DirectoryInfo>,
    pub total_files: usize,
    pub total_lines: usize,
}

/// Everything known about the workspace at one instant.
///
/// Built wholesale by the coordinator and never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub timestamp: DateTime<Utc>,
    pub structure: ProjectStructure,
    pub recent_changes: Vec<FileChange>,
    pub git_status: GitStatus,
    pub active_errors: Vec<ErrorInfo>,
    pub build_status: BuildStatus,
    pub running_processes: Vec<ProcessInfo>,
    pub dependencies: Vec<DependencyInfo>,
    pub services: Vec<ServiceInfo>,
    pub languages: Vec<DetectedLanguage>,
    pub primary_language: String,
    pub todos: Vec<TodoItem>,
    pub health: Health,
}
