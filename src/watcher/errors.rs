//! Error watcher: quick compiler probes every tick, the full plugin analysis
//! on a slower cadence.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Watcher;
use crate::Settings;
use crate::plugins::go::parse_go_diagnostics;
use crate::plugins::javascript::node_tool;
use crate::plugins::logs::{LOG_GLOBS, generic_log_table, scan_logs};
use crate::plugins::typescript::parse_tsc_output;
use crate::plugins::{LanguageReport, PluginContext, PluginRegistry};
use crate::types::{ErrorInfo, ErrorKind, Severity};

#[derive(Debug, Clone, Default)]
pub struct ErrorSlice {
    /// Findings of this tick's quick probes
    pub quick: Vec<ErrorInfo>,
    /// Latest full registry analysis, carried between ticks
    pub report: Arc<LanguageReport>,
}

pub struct ErrorWatcher {
    root: PathBuf,
    registry: Arc<PluginRegistry>,
    ctx: PluginContext,
    interval: Duration,
    analysis_interval: Duration,
    last_analysis: Option<Instant>,
    report: Arc<LanguageReport>,
}

impl ErrorWatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        settings: &Settings,
        registry: Arc<PluginRegistry>,
        ctx: PluginContext,
    ) -> Self {
        Self {
            root: root.into(),
            registry,
            ctx,
            interval: settings.watch.error_interval(),
            analysis_interval: settings.watch.analysis_interval(),
            last_analysis: None,
            report: Arc::new(LanguageReport::default()),
        }
    }

    async fn typescript_probe(&self) -> Vec<ErrorInfo> {
        if !self.root.join("tsconfig.json").is_file() {
            return Vec::new();
        }
        let Some((program, mut args)) = node_tool(&self.ctx, "tsc") else {
            return Vec::new();
        };
        args.extend(["--noEmit", "--pretty", "false"].map(String::from));
        match self
            .ctx
            .try_run(&program, args.as_slice(), &self.root, self.ctx.timeouts.typecheck)
            .await
        {
            Some(output) => parse_tsc_output(&output.combined()),
            None => Vec::new(),
        }
    }

    async fn go_probe(&self) -> Vec<ErrorInfo> {
        if !self.root.join("go.mod").is_file() {
            return Vec::new();
        }
        match self
            .ctx
            .try_run("go", &["build", "./..."], &self.root, self.ctx.timeouts.build)
            .await
        {
            Some(output) if !output.success => {
                parse_go_diagnostics(&output.stderr, "go build", ErrorKind::Build, Severity::Error)
            }
            _ => Vec::new(),
        }
    }

    /// The built-in probes that bypass the plugin system.
    pub async fn quick_scan(&self) -> Vec<ErrorInfo> {
        let mut errors = self.typescript_probe().await;
        errors.extend(self.go_probe().await);
        errors.extend(scan_logs(&self.root, LOG_GLOBS, generic_log_table()));
        errors
    }

    fn analysis_due(&self, forced: bool) -> bool {
        forced
            || self
                .last_analysis
                .is_none_or(|at| at.elapsed() >= self.analysis_interval)
    }
}

#[async_trait]
impl Watcher for ErrorWatcher {
    type Slice = ErrorSlice;

    fn name(&self) -> &'static str {
        "errors"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, forced: bool) -> ErrorSlice {
        let quick = self.quick_scan().await;

        if self.analysis_due(forced) {
            let started = Instant::now();
            let report = self.registry.analyze_workspace(&self.root).await;
            crate::log_event!(
                "errors",
                "analysis",
                "{} findings across {} languages in {:?}",
                report.errors.len(),
                report.languages.len(),
                started.elapsed()
            );
            self.report = Arc::new(report);
            self.last_analysis = Some(Instant::now());
        }

        ErrorSlice {
            quick,
            report: Arc::clone(&self.report),
        }
    }
}
