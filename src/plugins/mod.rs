//! Language plugins: per-ecosystem detection and analysis.
//!
//! Every plugin implements [`LanguagePlugin`]. Analysis methods are
//! best-effort: each runs several independent sub-checks, and a missing
//! tool, missing config file, timeout or unparseable output only removes that
//! sub-check's contribution. Structured (JSON) tool output is preferred and
//! the plugin's [`PatternTable`] is the fallback.

mod error;
pub mod go;
pub mod javascript;
pub mod logs;
pub mod patterns;
pub mod python;
pub mod registry;
pub mod rust;
pub mod services;
pub mod typescript;

use async_trait::async_trait;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub use error::{PluginError, PluginResult};
pub use go::GoPlugin;
pub use javascript::JavaScriptPlugin;
pub use patterns::{PatternSpec, PatternTable};
pub use python::PythonPlugin;
pub use registry::{LanguageReport, PluginRegistry};
pub use rust::RustPlugin;
pub use typescript::TypeScriptPlugin;

use crate::Settings;
use crate::tools::{ToolOutput, ToolRunner, ToolTimeouts};
use crate::types::{DependencyInfo, ErrorInfo, ErrorKind, ServiceInfo, TestResults};
use crate::walker::{ProjectWalker, has_extension};

/// Static description of a plugin.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: &'static str,
    /// Handled file extensions, without the dot
    pub extensions: &'static [&'static str],
    /// Files whose presence at the workspace root marks the ecosystem
    pub config_files: &'static [&'static str],
    pub patterns: PatternTable,
}

impl PluginDescriptor {
    pub fn handles(&self, path: &Path) -> bool {
        has_extension(path, self.extensions)
    }

    /// Config markers present directly under `root`.
    pub fn present_config_files(&self, root: &Path) -> Vec<String> {
        self.config_files
            .iter()
            .filter(|name| root.join(name).is_file())
            .map(|name| name.to_string())
            .collect()
    }
}

/// What every plugin needs from the outside world.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    pub runner: ToolRunner,
    pub timeouts: ToolTimeouts,
    pub walker: ProjectWalker,
    pub run_build_scripts: bool,
}

impl PluginContext {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            runner: ToolRunner::new(),
            timeouts: settings.tools.timeouts(),
            walker: ProjectWalker::from_settings(settings),
            run_build_scripts: settings.tools.run_build_scripts,
        }
    }

    pub fn with_runner(mut self, runner: ToolRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Runs a tool and collapses every failure into `None`, logging why.
    ///
    /// This is the shape of a best-effort sub-check: absent or slow tools
    /// contribute nothing.
    pub async fn try_run<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
        cwd: &Path,
        limit: std::time::Duration,
    ) -> Option<ToolOutput> {
        match self.runner.run(program, args, cwd, limit).await {
            Ok(output) => Some(output),
            Err(e) if e.is_unavailable() => {
                crate::debug_event!("plugins", "skipped", "{e}");
                None
            }
            Err(e) => {
                tracing::warn!("[plugins] {e}");
                None
            }
        }
    }

    /// Source files under `root` with one of `extensions`.
    pub fn source_files(&self, root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
        self.walker.files_with_extensions(root, extensions)
    }
}

/// One language ecosystem's analysis capabilities.
#[async_trait]
pub trait LanguagePlugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Config markers at the root, or any file with a handled extension.
    fn detect(&self, root: &Path) -> bool;

    /// Runs every available error sub-check and concatenates the results.
    async fn analyze_errors(&self, root: &Path) -> Vec<ErrorInfo>;

    /// Parses the ecosystem's manifest files.
    fn dependencies(&self, root: &Path) -> Vec<DependencyInfo>;

    /// Services declared by manifests plus anything listening on the
    /// ecosystem's conventional ports.
    async fn find_services(&self, root: &Path) -> Vec<ServiceInfo>;

    async fn run_linter(&self, root: &Path) -> Vec<ErrorInfo>;

    async fn run_tests(&self, root: &Path) -> PluginResult<TestResults>;

    /// Normalizes arbitrary build output with this plugin's rules.
    fn parse_build_output(&self, output: &str) -> Vec<ErrorInfo>;
}

/// Shared detection used by every plugin.
pub(crate) fn detect_with(descriptor: &PluginDescriptor, ctx: &PluginContext, root: &Path) -> bool {
    !descriptor.present_config_files(root).is_empty()
        || ctx.walker.files(root).any(|path| descriptor.handles(&path))
}

/// Keeps the first occurrence of each dependency name.
pub(crate) fn dedupe_by_name(deps: Vec<DependencyInfo>) -> Vec<DependencyInfo> {
    let mut seen = HashSet::new();
    deps.into_iter()
        .filter(|dep| seen.insert(dep.name.clone()))
        .collect()
}

/// Keeps at most one syntax report per file: secondary tools lose to the
/// primary syntax check, and among themselves the first report wins.
pub(crate) fn drop_duplicate_syntax(primary: &[ErrorInfo], secondary: Vec<ErrorInfo>) -> Vec<ErrorInfo> {
    let mut flagged: HashSet<String> = primary
        .iter()
        .filter(|e| e.kind == ErrorKind::Syntax)
        .map(|e| e.file.clone())
        .collect();
    secondary
        .into_iter()
        .filter(|e| e.kind != ErrorKind::Syntax || flagged.insert(e.file.clone()))
        .collect()
}

/// Folds the error watcher's quick probes into the full analysis.
///
/// A quick finding survives only if the analysis has not already reported
/// it; syntax errors stay one per file. Each log line contributes a single
/// finding, however many plugins' log tables matched it.
pub fn merge_findings(quick: Vec<ErrorInfo>, full: &[ErrorInfo]) -> Vec<ErrorInfo> {
    let quick: Vec<ErrorInfo> = drop_duplicate_syntax(full, quick)
        .into_iter()
        .filter(|q| !full.iter().any(|f| f.same_finding(q)))
        .collect();

    let mut log_lines = HashSet::new();
    quick
        .into_iter()
        .chain(full.iter().cloned())
        .filter(|e| !e.file.ends_with(".log") || log_lines.insert((e.file.clone(), e.line)))
        .collect()
}
