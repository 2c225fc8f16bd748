//! Version-control watcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

use super::Watcher;
use crate::Settings;
use crate::tools::ToolRunner;
use crate::types::GitStatus;

/// Length of the abbreviated commit hash.
const SHORT_HASH_LEN: usize = 8;

/// Paths from `git status --porcelain` (v1) output, filed into
/// `(staged, modified, untracked)`.
///
/// `??` is untracked. Otherwise a non-blank index column marks the path
/// staged and a non-blank worktree column marks it modified, so a path
/// changed again after staging appears in both lists.
pub fn parse_porcelain(output: &str) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut staged = Vec::new();
    let mut modified = Vec::new();
    let mut untracked = Vec::new();

    for line in output.lines() {
        if line.len() < 4 || !line.is_char_boundary(2) {
            continue;
        }
        let (code, rest) = line.split_at(2);
        let path = rest.trim_start();
        let path = path.rsplit(" -> ").next().unwrap_or(path);
        let path = path.trim_matches('"').to_string();

        let mut columns = code.chars();
        let index = columns.next().unwrap_or(' ');
        let worktree = columns.next().unwrap_or(' ');
        match (index, worktree) {
            ('?', '?') => untracked.push(path),
            ('!', '!') => {}
            _ => {
                if index != ' ' {
                    staged.push(path.clone());
                }
                if worktree != ' ' {
                    modified.push(path);
                }
            }
        }
    }
    (staged, modified, untracked)
}

/// Parses `git log -1 --pretty=format:%H|%s|%ct`.
fn parse_last_commit(output: &str) -> Option<(String, String, Option<DateTime<Utc>>)> {
    let line = output.trim();
    let (hash, rest) = line.split_once('|')?;
    let (message, timestamp) = rest.rsplit_once('|')?;
    let short = hash.chars().take(SHORT_HASH_LEN).collect();
    let time = timestamp
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    Some((short, message.to_string(), time))
}

/// Parses `git rev-list --left-right --count @{upstream}...HEAD` into
/// `(ahead, behind)`.
fn parse_ahead_behind(output: &str) -> Option<(u32, u32)> {
    let mut counts = output.split_whitespace();
    let behind = counts.next()?.parse().ok()?;
    let ahead = counts.next()?.parse().ok()?;
    Some((ahead, behind))
}

pub struct GitWatcher {
    root: PathBuf,
    runner: ToolRunner,
    interval: Duration,
    timeout: Duration,
}

impl GitWatcher {
    pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self::with_runner(root, settings, ToolRunner::new())
    }

    pub fn with_runner(root: impl Into<PathBuf>, settings: &Settings, runner: ToolRunner) -> Self {
        Self {
            root: root.into(),
            runner,
            interval: settings.watch.git_interval(),
            timeout: settings.tools.timeouts().probe,
        }
    }

    /// stdout of a successful git invocation.
    async fn git(&self, args: &[&str]) -> Option<String> {
        match self.runner.run("git", args, &self.root, self.timeout).await {
            Ok(output) if output.success => Some(output.stdout),
            Ok(_) => None,
            Err(e) => {
                crate::debug_event!("git", "unavailable", "{e}");
                None
            }
        }
    }

    /// Current status; the zero value outside a repository.
    pub async fn status(&self) -> GitStatus {
        let inside = self.git(&["rev-parse", "--is-inside-work-tree"]).await;
        if inside.as_deref().map(str::trim) != Some("true") {
            return GitStatus::default();
        }

        let branch = match self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await {
            Some(branch) => branch.trim().to_string(),
            // No commits yet: HEAD does not resolve but still names a branch.
            None => self
                .git(&["symbolic-ref", "--short", "HEAD"])
                .await
                .map(|b| b.trim().to_string())
                .unwrap_or_default(),
        };
        let mut status = GitStatus {
            branch,
            ..Default::default()
        };

        if let Some((hash, message, time)) = self
            .git(&["log", "-1", "--pretty=format:%H|%s|%ct"])
            .await
            .as_deref()
            .and_then(parse_last_commit)
        {
            status.commit_hash = hash;
            status.commit_message = message;
            status.last_commit_time = time;
        }

        if let Some(porcelain) = self.git(&["status", "--porcelain"]).await {
            let (staged, modified, untracked) = parse_porcelain(&porcelain);
            status.staged = staged;
            status.modified = modified;
            status.untracked = untracked;
        }

        if let Some((ahead, behind)) = self
            .git(&["rev-list", "--left-right", "--count", "@{upstream}...HEAD"])
            .await
            .as_deref()
            .and_then(parse_ahead_behind)
        {
            status.ahead = ahead;
            status.behind = behind;
        }

        status.settle_dirty();
        status
    }
}

#[async_trait]
impl Watcher for GitWatcher {
    type Slice = GitStatus;

    fn name(&self) -> &'static str {
        "git"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, _forced: bool) -> GitStatus {
        self.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_porcelain_partition() {
        let output = "\
M  src/staged.rs
 M src/edited.rs
MM src/both.rs
?? notes.txt
R  old.rs -> new.rs
A  \"with space.rs\"
!! ignored.log
";
        let (staged, modified, untracked) = parse_porcelain(output);
        assert_eq!(staged, vec!["src/staged.rs", "src/both.rs", "new.rs", "with space.rs"]);
        assert_eq!(modified, vec!["src/edited.rs", "src/both.rs"]);
        assert_eq!(untracked, vec!["notes.txt"]);
    }

    #[test]
    fn test_last_commit_line() {
        let (hash, message, time) =
            parse_last_commit("0123456789abcdef0123|fix: handle a|b pipes|1700000000").unwrap();
        assert_eq!(hash, "01234567");
        assert_eq!(message, "fix: handle a|b pipes");
        assert_eq!(time.unwrap().timestamp(), 1_700_000_000);
        assert!(parse_last_commit("").is_none());
    }

    #[test]
    fn test_ahead_behind() {
        assert_eq!(parse_ahead_behind("2\t5\n"), Some((5, 2)));
        assert_eq!(parse_ahead_behind("fatal: no upstream"), None);
    }

    #[tokio::test]
    async fn test_non_repository_is_zero_value() {
        let dir = TempDir::new().unwrap();
        let watcher = GitWatcher::new(dir.path(), &Settings::default());
        let status = watcher.status().await;
        assert_eq!(status, GitStatus::default());
        assert_eq!(status.branch, "");
        assert!(!status.dirty);
    }

    #[tokio::test]
    async fn test_missing_git_binary_is_zero_value() {
        let dir = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let watcher = GitWatcher::with_runner(
            dir.path(),
            &Settings::default(),
            ToolRunner::with_search_path(empty.path()),
        );
        assert_eq!(watcher.status().await, GitStatus::default());
    }

    #[tokio::test]
    async fn test_fresh_repository() {
        if which::which("git").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let git = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap()
        };
        git(&["init", "-q"]);
        git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(dir.path().join("readme.md"), "hi\n").unwrap();

        let watcher = GitWatcher::new(dir.path(), &Settings::default());
        let status = watcher.status().await;
        assert_eq!(status.branch, "main");
        assert_eq!(status.untracked, vec!["readme.md"]);
        assert!(status.dirty);
        assert!(status.commit_hash.is_empty());
    }
}
