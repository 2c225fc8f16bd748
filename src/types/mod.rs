mod diagnostics;
mod project;
mod snapshot;

pub use diagnostics::{ErrorInfo, ErrorKind, Severity};
pub use project::{
    DependencyInfo, DependencyKind, DetectedLanguage, ServiceInfo, ServiceStatus, TestFailure,
    TestResults, TodoItem, TodoMarker,
};
pub use snapshot::{
    BuildStatus, ChangeKind, DebtLevel, DirectoryInfo, FileChange, FileInfo, GitStatus, Health,
    ProcessInfo, ProjectSnapshot, ProjectStructure,
};
