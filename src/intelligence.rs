//! The daemon's public face.
//!
//! ```ignore
//! let intelligence = ProjectIntelligence::start(Settings::load()?)?;
//! let snapshot = intelligence.wait_until_ready(Duration::from_secs(30)).await?;
//! println!("health {}", snapshot.health.score);
//! intelligence.shutdown().await;
//! ```

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::Settings;
use crate::error::{ArgusError, ArgusResult};
use crate::plugins::PluginContext;
use crate::snapshot::{CoordinatorState, RefreshTrigger, Revision, SnapshotCoordinator, SnapshotStore};
use crate::types::{
    DependencyInfo, DetectedLanguage, ErrorInfo, ProjectSnapshot, ServiceInfo, TestResults,
};
use crate::workspace::Workspace;

/// A running daemon: the coordinator task, its watchers and the snapshot
/// they publish.
///
/// Dropping this stops the background tasks; [`Self::shutdown`] also waits
/// for them to finish.
pub struct ProjectIntelligence {
    workspace: Arc<Workspace>,
    store: Arc<SnapshotStore>,
    trigger: Arc<RefreshTrigger>,
    state: Arc<Mutex<CoordinatorState>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _stop_on_drop: DropGuard,
}

impl ProjectIntelligence {
    /// Validates the workspace and starts every watcher. Must be called from
    /// within a tokio runtime.
    pub fn start(settings: Settings) -> ArgusResult<Self> {
        Ok(Self::start_in(Workspace::open(settings)?))
    }

    pub fn start_with_context(settings: Settings, ctx: PluginContext) -> ArgusResult<Self> {
        Ok(Self::start_in(Workspace::with_context(settings, ctx)?))
    }

    fn start_in(workspace: Workspace) -> Self {
        let cancel = CancellationToken::new();
        let store = Arc::new(SnapshotStore::new());
        let coordinator = SnapshotCoordinator::new(
            workspace.root().to_path_buf(),
            workspace.settings(),
            Arc::clone(workspace.registry()),
            workspace.context().clone(),
            Arc::clone(&store),
            &cancel,
        );
        let trigger = coordinator.trigger();
        let state = coordinator.state();
        let task = tokio::spawn(coordinator.run(cancel.clone()));

        Self {
            workspace: Arc::new(workspace),
            store,
            trigger,
            state,
            _stop_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    pub fn root(&self) -> &Path {
        self.workspace.root()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    /// The latest snapshot, or [`ArgusError::NotReady`] before the first
    /// refresh completes.
    pub fn snapshot(&self) -> ArgusResult<Arc<ProjectSnapshot>> {
        self.store.get().ok_or(ArgusError::NotReady)
    }

    pub async fn wait_until_ready(&self, limit: Duration) -> ArgusResult<Arc<ProjectSnapshot>> {
        if let Some(snapshot) = self.store.get() {
            return Ok(snapshot);
        }
        self.store.wait_past(0, limit).await.ok_or(ArgusError::NotReady)
    }

    /// Requests an out-of-cycle refresh and returns immediately.
    pub fn trigger_refresh(&self) {
        self.trigger.request();
    }

    /// Requests a refresh and waits up to `limit` for the snapshot that
    /// answers it.
    pub async fn refresh(&self, limit: Duration) -> ArgusResult<Arc<ProjectSnapshot>> {
        let request = self.trigger.request();
        self.store
            .wait_served(request, limit)
            .await
            .ok_or(ArgusError::NotReady)
    }

    /// Changes once per published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.store.subscribe()
    }

    pub fn detected_languages(&self) -> Vec<DetectedLanguage> {
        self.workspace.detected_languages()
    }

    pub fn primary_language(&self) -> String {
        self.workspace.primary_language()
    }

    pub async fn analyze_language_errors(&self, language: &str) -> ArgusResult<Vec<ErrorInfo>> {
        self.workspace.analyze_language_errors(language).await
    }

    pub fn get_language_dependencies(&self, language: &str) -> ArgusResult<Vec<DependencyInfo>> {
        self.workspace.get_language_dependencies(language)
    }

    pub async fn find_language_services(&self, language: &str) -> ArgusResult<Vec<ServiceInfo>> {
        self.workspace.find_language_services(language).await
    }

    pub async fn run_language_linter(&self, language: &str) -> ArgusResult<Vec<ErrorInfo>> {
        self.workspace.run_language_linter(language).await
    }

    pub async fn run_language_tests(&self, language: &str) -> ArgusResult<TestResults> {
        self.workspace.run_language_tests(language).await
    }

    /// Stops the coordinator and every watcher, waiting for their tasks.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!("[coordinator] task panicked during shutdown");
            }
        }
    }
}
