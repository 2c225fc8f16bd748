//! Merges watcher slices into published snapshots.

use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::store::SnapshotStore;
use crate::Settings;
use crate::health;
use crate::plugins::registry::UNKNOWN_LANGUAGE;
use crate::plugins::{self, PluginContext, PluginRegistry};
use crate::types::{BuildStatus, GitStatus, ProcessInfo, ProjectSnapshot, ProjectStructure, Severity};
use crate::watcher::{
    self, BuildWatcher, ErrorSlice, ErrorWatcher, FileSlice, FileWatcher, GitWatcher,
    ProcessWatcher, Watcher, WatcherHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
}

/// Out-of-cycle refresh requests, numbered so a caller can tell which
/// publication answers its request.
#[derive(Debug, Default)]
pub struct RefreshTrigger {
    notify: Notify,
    requested: AtomicU64,
}

impl RefreshTrigger {
    /// Requests a refresh and returns its id. A request made during a
    /// refresh is kept and served right after it.
    pub fn request(&self) -> u64 {
        let id = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify.notify_one();
        id
    }

    fn latest(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }
}

/// The latest output of every watcher. A missing slice means that watcher
/// has not finished a poll yet.
#[derive(Debug, Clone, Default)]
pub struct Slices {
    pub files: Option<Arc<FileSlice>>,
    pub git: Option<Arc<GitStatus>>,
    pub errors: Option<Arc<ErrorSlice>>,
    pub processes: Option<Arc<Vec<ProcessInfo>>>,
    pub build: Option<Arc<BuildStatus>>,
}

/// Builds a snapshot from slices. Pure: health and build outcome are derived
/// from the same error list that ends up in the snapshot.
pub fn assemble(root: &Path, slices: &Slices) -> ProjectSnapshot {
    let (structure, recent_changes, todos) = match slices.files.as_deref() {
        Some(files) => (
            files.structure.clone(),
            files.recent_changes.clone(),
            files.todos.clone(),
        ),
        None => (
            ProjectStructure {
                root: root.to_path_buf(),
                ..Default::default()
            },
            Vec::new(),
            Vec::new(),
        ),
    };

    let errors = slices.errors.as_deref().cloned().unwrap_or_default();
    let report = errors.report;
    let active_errors = plugins::merge_findings(errors.quick, &report.errors);

    let mut build_status = slices.build.as_deref().cloned().unwrap_or_default();
    build_status.error_count = active_errors
        .iter()
        .filter(|e| e.severity == Severity::Error && e.kind.breaks_build())
        .count();
    build_status.success = build_status.error_count == 0;

    ProjectSnapshot {
        timestamp: Utc::now(),
        structure,
        recent_changes,
        git_status: slices.git.as_deref().cloned().unwrap_or_default(),
        health: health::assess(&active_errors),
        active_errors,
        build_status,
        running_processes: slices.processes.as_deref().cloned().unwrap_or_default(),
        dependencies: report.dependencies.clone(),
        services: report.services.clone(),
        languages: report.languages.clone(),
        primary_language: if report.primary_language.is_empty() {
            UNKNOWN_LANGUAGE.to_string()
        } else {
            report.primary_language.clone()
        },
        todos,
    }
}

/// Handles to the five running watcher tasks.
struct Watchers {
    files: WatcherHandle<FileSlice>,
    git: WatcherHandle<GitStatus>,
    errors: WatcherHandle<ErrorSlice>,
    processes: WatcherHandle<Vec<ProcessInfo>>,
    build: WatcherHandle<BuildStatus>,
}

impl Watchers {
    fn spawn(
        root: &Path,
        settings: &Settings,
        registry: Arc<PluginRegistry>,
        ctx: PluginContext,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            files: watcher::spawn(FileWatcher::new(root, settings), cancel.child_token()),
            git: watcher::spawn(
                GitWatcher::with_runner(root, settings, ctx.runner.clone()),
                cancel.child_token(),
            ),
            errors: watcher::spawn(
                ErrorWatcher::new(root, settings, registry, ctx),
                cancel.child_token(),
            ),
            processes: watcher::spawn(ProcessWatcher::new(root, settings), cancel.child_token()),
            build: watcher::spawn(BuildWatcher::new(root, settings), cancel.child_token()),
        }
    }

    /// Collects one slice per watcher.
    ///
    /// With `forced`, every watcher is first asked to re-poll and only slices
    /// from those polls are accepted. Otherwise any published slice will do.
    /// Either way a watcher that does not deliver within `limit` contributes
    /// whatever it last published.
    async fn collect(&self, forced: bool, limit: Duration) -> Slices {
        let (files, git, errors, processes, build) = if forced {
            (
                self.files.request_poll(),
                self.git.request_poll(),
                self.errors.request_poll(),
                self.processes.request_poll(),
                self.build.request_poll(),
            )
        } else {
            (0, 0, 0, 0, 0)
        };

        let (files, git, errors, processes, build) = tokio::join!(
            self.files.fresh(files, limit),
            self.git.fresh(git, limit),
            self.errors.fresh(errors, limit),
            self.processes.fresh(processes, limit),
            self.build.fresh(build, limit),
        );
        Slices {
            files,
            git,
            errors,
            processes,
            build,
        }
    }

    async fn join(self) {
        tokio::join!(
            self.files.join(),
            self.git.join(),
            self.errors.join(),
            self.processes.join(),
            self.build.join(),
        );
    }
}

/// Owns the watcher tasks and publishes a merged snapshot every
/// `snapshot_interval`, or immediately when triggered.
pub struct SnapshotCoordinator {
    root: PathBuf,
    store: Arc<SnapshotStore>,
    watchers: Watchers,
    trigger: Arc<RefreshTrigger>,
    state: Arc<Mutex<CoordinatorState>>,
    interval: Duration,
    refresh_wait: Duration,
}

impl SnapshotCoordinator {
    /// Spawns the watchers. Nothing is published until [`Self::run`] starts.
    pub fn new(
        root: PathBuf,
        settings: &Settings,
        registry: Arc<PluginRegistry>,
        ctx: PluginContext,
        store: Arc<SnapshotStore>,
        cancel: &CancellationToken,
    ) -> Self {
        let watchers = Watchers::spawn(&root, settings, registry, ctx, cancel);
        Self {
            root,
            store,
            watchers,
            trigger: Arc::new(RefreshTrigger::default()),
            state: Arc::new(Mutex::new(CoordinatorState::Idle)),
            interval: settings.watch.snapshot_interval(),
            refresh_wait: settings.watch.refresh_wait(),
        }
    }

    pub fn trigger(&self) -> Arc<RefreshTrigger> {
        Arc::clone(&self.trigger)
    }

    pub fn state(&self) -> Arc<Mutex<CoordinatorState>> {
        Arc::clone(&self.state)
    }

    async fn refresh(&self, forced: bool) {
        *self.state.lock() = CoordinatorState::Refreshing;
        let started = Instant::now();
        // Every request made so far is answered by the re-polls below.
        let served = if forced { self.trigger.latest() } else { 0 };

        let slices = self.watchers.collect(forced, self.refresh_wait).await;
        let snapshot = assemble(&self.root, &slices);
        let summary = format!(
            "score={} errors={} warnings={} files={} changes={}",
            snapshot.health.score,
            snapshot.health.error_count,
            snapshot.health.warning_count,
            snapshot.structure.total_files,
            snapshot.recent_changes.len()
        );
        *self.state.lock() = CoordinatorState::Idle;
        let revision = self.store.publish(snapshot, served);
        crate::log_event!(
            "coordinator",
            "published",
            "#{revision}{} {summary} in {:?}",
            if forced { " (requested)" } else { "" },
            started.elapsed()
        );
    }

    /// Publishes until `cancel` fires, then waits for every watcher to stop.
    ///
    /// The first refresh runs immediately and waits for each watcher's first
    /// slice.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        crate::log_event!("coordinator", "started", "{}", self.root.display());

        loop {
            let forced = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => false,
                _ = self.trigger.notify.notified() => true,
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.refresh(forced) => {}
            }
            if forced {
                ticker.reset();
            }
        }

        *self.state.lock() = CoordinatorState::Idle;
        self.watchers.join().await;
        crate::log_event!("coordinator", "stopped");
    }
}

/// Polls every watcher once, out of band, and assembles the result.
///
/// Used for one-shot reports where no daemon is running.
pub async fn build_once(
    root: &Path,
    settings: &Settings,
    registry: Arc<PluginRegistry>,
    ctx: PluginContext,
) -> ProjectSnapshot {
    let mut files = FileWatcher::new(root, settings);
    let mut git = GitWatcher::with_runner(root, settings, ctx.runner.clone());
    let mut errors = ErrorWatcher::new(root, settings, registry, ctx);
    let mut processes = ProcessWatcher::new(root, settings);
    let mut build = BuildWatcher::new(root, settings);

    let (files, git, errors, processes, build) = tokio::join!(
        files.poll(true),
        git.poll(true),
        errors.poll(true),
        processes.poll(true),
        build.poll(true),
    );
    let slices = Slices {
        files: Some(Arc::new(files)),
        git: Some(Arc::new(git)),
        errors: Some(Arc::new(errors)),
        processes: Some(Arc::new(processes)),
        build: Some(Arc::new(build)),
    };
    assemble(root, &slices)
}
