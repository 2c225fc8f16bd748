//! Time-bounded execution of external tools.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::error::{ToolError, ToolResult};

/// Captured result of a finished tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Locates and runs external binaries.
///
/// Every run is bounded by a timeout and the child is killed if the caller
/// stops waiting for it. By default binaries are looked up on `PATH`; a runner
/// built with [`ToolRunner::with_search_path`] only sees the directories given.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    search_path: Option<OsString>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(path.into()),
        }
    }

    /// Resolves `program` to an executable path, if one exists.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                which::which_in(program, Some(paths), cwd).ok()
            }
            None => which::which(program).ok(),
        }
    }

    pub fn available(&self, program: &str) -> bool {
        self.resolve(program).is_some()
    }

    /// First candidate that resolves, in the order given.
    pub fn first_available<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|c| self.available(c))
    }

    /// Runs `program` in `cwd` and waits at most `limit` for it to exit.
    ///
    /// A non-zero exit status is not an error here: most linters exit non-zero
    /// exactly when they have something to report.
    pub async fn run<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
        cwd: &Path,
        limit: Duration,
    ) -> ToolResult<ToolOutput> {
        let resolved = self.resolve(program).ok_or_else(|| ToolError::NotFound {
            program: program.to_string(),
        })?;

        let child = Command::new(&resolved)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                crate::debug_event!(
                    "tools",
                    "finished",
                    "{program} exit={:?} stdout={}B stderr={}B",
                    output.status.code(),
                    output.stdout.len(),
                    output.stderr.len()
                );
                Ok(ToolOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Ok(Err(source)) => Err(ToolError::Spawn {
                program: program.to_string(),
                source,
            }),
            Err(_) => {
                tracing::warn!("[tools] {program} timed out after {limit:?}");
                Err(ToolError::Timeout {
                    program: program.to_string(),
                    limit,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_search_path_finds_nothing() {
        let empty = TempDir::new().unwrap();
        let runner = ToolRunner::with_search_path(empty.path().as_os_str());
        assert!(!runner.available("sh"));
        assert!(runner.first_available(&["python3", "python"]).is_none());
    }

    #[tokio::test]
    async fn test_missing_tool_is_not_found() {
        let empty = TempDir::new().unwrap();
        let runner = ToolRunner::with_search_path(empty.path().as_os_str());
        let err = runner
            .run("eslint", &["--version"], empty.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
        assert!(err.is_unavailable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let runner = ToolRunner::new();
        if !runner.available("sh") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let out = runner
            .run(
                "sh",
                &["-c", "echo out; echo err 1>&2; exit 3"],
                dir.path(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(out.combined().contains("out\nerr"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let runner = ToolRunner::new();
        if !runner.available("sleep") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let err = runner
            .run("sleep", &["5"], dir.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
