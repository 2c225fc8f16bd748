//! Process watcher.
//!
//! Attribution is heuristic: a process counts when its name matches a known
//! ecosystem runtime, or when its working directory or command line points
//! into the workspace. There is no parent/child verification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use super::Watcher;
use crate::Settings;
use crate::types::ProcessInfo;

const RUNTIMES: &[&str] = &[
    "node", "npm", "npx", "yarn", "pnpm", "bun", "deno", "tsc", "vite", "webpack", "next", "jest",
    "python", "python3", "pip", "uvicorn", "gunicorn", "flask", "pytest", "celery", "go", "gopls",
    "air", "cargo", "rustc", "rust-analyzer",
];

/// True when `name` is a runtime, or a runtime followed by a version suffix
/// such as `python3.12`.
pub fn is_runtime(name: &str) -> bool {
    let name = name.strip_suffix(".exe").unwrap_or(name).to_ascii_lowercase();
    RUNTIMES.iter().any(|runtime| {
        name.strip_prefix(runtime)
            .is_some_and(|rest| rest.is_empty() || rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
    })
}

/// Owns a [`System`] across polls so CPU usage has a previous sample.
pub(super) struct ProcessTable {
    system: System,
    root: PathBuf,
    own_pid: Option<Pid>,
}

impl ProcessTable {
    pub(super) fn new(root: PathBuf) -> Self {
        Self {
            system: System::new(),
            root,
            own_pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn points_into_workspace(&self, cwd: Option<&Path>, command: &str) -> bool {
        cwd.is_some_and(|dir| dir.starts_with(&self.root))
            || command.contains(self.root.to_string_lossy().as_ref())
    }

    /// Every process on the machine except this one.
    pub(super) fn scan(&mut self) -> Vec<ProcessInfo> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::OnlyIfNotSet)
                .with_cpu()
                .with_memory(),
        );

        let mut processes: Vec<ProcessInfo> = self
            .system
            .processes()
            .values()
            .filter(|p| Some(p.pid()) != self.own_pid)
            .map(|p| {
                let name = p.name().to_string_lossy().into_owned();
                let command = if p.cmd().is_empty() {
                    name.clone()
                } else {
                    p.cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                let start_time = match p.start_time() {
                    0 => None,
                    secs => DateTime::<Utc>::from_timestamp(secs as i64, 0),
                };
                ProcessInfo {
                    pid: p.pid().as_u32(),
                    project_related: self.points_into_workspace(p.cwd(), &command),
                    name,
                    command,
                    start_time,
                    cpu_percent: p.cpu_usage(),
                    memory_mb: p.memory() as f64 / (1024.0 * 1024.0),
                }
            })
            .collect();
        processes.sort_by_key(|p| p.pid);
        processes
    }
}

pub struct ProcessWatcher {
    table: ProcessTable,
    interval: Duration,
}

impl ProcessWatcher {
    pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            table: ProcessTable::new(root.into()),
            interval: settings.watch.process_interval(),
        }
    }

    /// Runtime processes and anything pointing into the workspace.
    pub fn relevant(&mut self) -> Vec<ProcessInfo> {
        self.table
            .scan()
            .into_iter()
            .filter(|p| p.project_related || is_runtime(&p.name))
            .collect()
    }
}

#[async_trait]
impl Watcher for ProcessWatcher {
    type Slice = Vec<ProcessInfo>;

    fn name(&self) -> &'static str {
        "processes"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, _forced: bool) -> Vec<ProcessInfo> {
        self.relevant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_names() {
        assert!(is_runtime("node"));
        assert!(is_runtime("python3.12"));
        assert!(is_runtime("cargo.exe"));
        assert!(!is_runtime("nodemon-helper"));
        assert!(!is_runtime("gopher"));
        assert!(!is_runtime("bash"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_child_in_workspace_is_project_related() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut child = tokio::process::Command::new("sleep")
            .arg("5")
            .current_dir(&root)
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let mut watcher = ProcessWatcher::new(&root, &Settings::default());
        let processes = watcher.relevant();
        let own = std::process::id();
        assert!(processes.iter().all(|p| p.pid != own));
        let found = processes.iter().find(|p| p.pid == pid).unwrap();
        assert!(found.project_related);
        assert_eq!(found.name, "sleep");

        child.kill().await.unwrap();
    }
}
