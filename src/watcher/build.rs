//! Build watcher: running build commands and the age of build outputs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use super::Watcher;
use super::processes::ProcessTable;
use crate::Settings;
use crate::types::{BuildStatus, ProcessInfo};

/// Directories a build conventionally writes to, relative to the root.
const OUTPUT_DIRS: &[&str] = &["dist", "build", "target", "out", ".next", "bin"];

static BUILD_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \b(?:npm|yarn|pnpm|bun)\s+(?:run\s+)?build\b
        | \btsc\b
        | \bwebpack\b
        | \bvite\s+build\b
        | \bnext\s+build\b
        | \bgo\s+build\b
        | \bcargo\s+(?:build|check)\b
        | (?:^|/)make(?:\s|$)
        | \bpython3?\s+-m\s+build\b
        | \bsetup\.py\s+(?:build|bdist_wheel|sdist)\b
        ",
    )
    .expect("build command regex is valid")
});

pub fn is_build_command(command: &str) -> bool {
    BUILD_COMMAND.is_match(command)
}

/// Output directories that exist under `root`.
fn output_dirs(root: &Path) -> Vec<String> {
    OUTPUT_DIRS
        .iter()
        .filter(|name| root.join(name).is_dir())
        .map(|name| name.to_string())
        .collect()
}

/// Newest mtime among the output directories and their direct children.
fn last_build_time(root: &Path, dirs: &[String]) -> Option<DateTime<Utc>> {
    let mut newest: Option<SystemTime> = None;
    let mut consider = |path: &Path| {
        if let Ok(modified) = path.metadata().and_then(|m| m.modified()) {
            if newest.is_none_or(|n| modified > n) {
                newest = Some(modified);
            }
        }
    };

    for dir in dirs {
        let dir = root.join(dir);
        consider(&dir);
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                consider(&entry.path());
            }
        }
    }
    newest.map(DateTime::<Utc>::from)
}

/// Commands of workspace processes that look like builds, deduplicated in
/// pid order.
fn active_commands(processes: &[ProcessInfo]) -> Vec<String> {
    let mut commands: Vec<String> = Vec::new();
    for process in processes.iter().filter(|p| p.project_related) {
        if is_build_command(&process.command) && !commands.contains(&process.command) {
            commands.push(process.command.clone());
        }
    }
    commands
}

/// Reports everything about a build except its outcome; `success` and
/// `error_count` are filled in from the merged error list at assembly.
pub struct BuildWatcher {
    root: PathBuf,
    table: ProcessTable,
    interval: Duration,
}

impl BuildWatcher {
    pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        let root = root.into();
        Self {
            table: ProcessTable::new(root.clone()),
            root,
            interval: settings.watch.build_interval(),
        }
    }

    pub fn status(&mut self) -> BuildStatus {
        let active_commands = active_commands(&self.table.scan());
        let output_dirs = output_dirs(&self.root);
        BuildStatus {
            is_building: !active_commands.is_empty(),
            active_commands,
            last_build_time: last_build_time(&self.root, &output_dirs),
            output_dirs,
            success: false,
            error_count: 0,
        }
    }
}

#[async_trait]
impl Watcher for BuildWatcher {
    type Slice = BuildStatus;

    fn name(&self) -> &'static str {
        "build"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, _forced: bool) -> BuildStatus {
        self.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn process(pid: u32, command: &str, project_related: bool) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: command.split_whitespace().next().unwrap_or_default().to_string(),
            command: command.to_string(),
            start_time: None,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            project_related,
        }
    }

    #[test]
    fn test_build_commands() {
        for command in [
            "npm run build",
            "yarn build",
            "node /usr/lib/node_modules/typescript/bin/tsc -p .",
            "npx vite build",
            "go build ./...",
            "cargo build --release",
            "/usr/bin/make all",
            "make",
            "python3 -m build",
        ] {
            assert!(is_build_command(command), "{command}");
        }
        for command in ["npm start", "vite", "go run .", "cargo test", "makepkg", "python app.py"] {
            assert!(!is_build_command(command), "{command}");
        }
    }

    #[test]
    fn test_only_workspace_builds_count() {
        let processes = vec![
            process(10, "npm run build", true),
            process(11, "cargo build", false),
            process(12, "npm run build", true),
            process(13, "node server.js", true),
        ];
        assert_eq!(active_commands(&processes), vec!["npm run build"]);
    }

    #[test]
    fn test_output_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/app.js"), "").unwrap();
        fs::write(dir.path().join("build"), "not a directory").unwrap();

        let dirs = output_dirs(dir.path());
        assert_eq!(dirs, vec!["dist"]);
        assert!(last_build_time(dir.path(), &dirs).is_some());
        assert!(last_build_time(dir.path(), &[]).is_none());
    }

    #[test]
    fn test_status_without_outputs() {
        let dir = TempDir::new().unwrap();
        let mut watcher = BuildWatcher::new(dir.path(), &Settings::default());
        let status = watcher.status();
        assert!(!status.is_building);
        assert!(status.output_dirs.is_empty());
        assert!(status.last_build_time.is_none());
    }
}
