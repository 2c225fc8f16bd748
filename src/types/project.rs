//! Facts extracted from manifests and per-language tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Direct,
    Dev,
    Types,
    Compiler,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub name: String,
    pub version: String,
    pub kind: DependencyKind,
    /// Manifest the dependency was read from, relative to the workspace.
    pub source: String,
}

impl DependencyInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        kind: DependencyKind,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind,
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Error,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    pub framework: String,
    pub port: u16,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub message: String,
}

/// Outcome of one test-suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub last_run: DateTime<Utc>,
    #[serde(default)]
    pub failures: Vec<TestFailure>,
}

impl Default for TestResults {
    fn default() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            duration_ms: None,
            last_run: Utc::now(),
            failures: Vec::new(),
        }
    }
}

impl TestResults {
    /// Fills `total` from the parts when the runner did not print one.
    pub fn settle_total(&mut self) {
        let counted = self.passed + self.failed + self.skipped;
        if self.total < counted {
            self.total = counted;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub name: String,
    pub file_count: usize,
    #[serde(default)]
    pub config_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TodoMarker {
    Todo,
    Fixme,
    Hack,
    Xxx,
    Note,
}

impl TodoMarker {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "TODO" => Some(TodoMarker::Todo),
            "FIXME" => Some(TodoMarker::Fixme),
            "HACK" => Some(TodoMarker::Hack),
            "XXX" => Some(TodoMarker::Xxx),
            "NOTE" => Some(TodoMarker::Note),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub file: String,
    pub line: u32,
    pub marker: TodoMarker,
    pub message: String,
}
