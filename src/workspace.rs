//! A validated workspace and the per-language operations on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Settings;
use crate::error::{ArgusError, ArgusResult};
use crate::plugins::{LanguagePlugin, PluginContext, PluginRegistry};
use crate::snapshot;
use crate::types::{
    DependencyInfo, DetectedLanguage, ErrorInfo, ProjectSnapshot, ServiceInfo, TestResults,
};

/// Canonical workspace root plus the plugin registry built for it.
///
/// Per-language calls are answered directly by the named plugin; nothing here
/// needs the daemon to be running.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    settings: Arc<Settings>,
    ctx: PluginContext,
    registry: Arc<PluginRegistry>,
}

impl Workspace {
    pub fn open(settings: Settings) -> ArgusResult<Self> {
        let ctx = PluginContext::from_settings(&settings);
        Self::with_context(settings, ctx)
    }

    /// Opens the workspace with a caller-supplied plugin context, e.g. a
    /// tool runner restricted to a given search path.
    pub fn with_context(settings: Settings, ctx: PluginContext) -> ArgusResult<Self> {
        let requested = settings.resolve_workspace();
        let root = requested
            .canonicalize()
            .ok()
            .filter(|path| path.is_dir())
            .ok_or_else(|| ArgusError::WorkspaceInvalid {
                path: requested.clone(),
            })?;

        let registry = Arc::new(PluginRegistry::with_context(&settings, ctx.clone()));
        crate::debug_event!(
            "workspace",
            "opened",
            "{} with plugins {:?}",
            root.display(),
            registry.names()
        );

        Ok(Self {
            root,
            settings: Arc::new(settings),
            ctx,
            registry,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn plugin(&self, language: &str) -> ArgusResult<Arc<dyn LanguagePlugin>> {
        self.registry.get_plugin(language)
    }

    pub fn detected_languages(&self) -> Vec<DetectedLanguage> {
        self.registry.detect_languages(&self.root)
    }

    pub fn primary_language(&self) -> String {
        PluginRegistry::primary_language(&self.detected_languages())
    }

    pub async fn analyze_language_errors(&self, language: &str) -> ArgusResult<Vec<ErrorInfo>> {
        let plugin = self.plugin(language)?;
        Ok(plugin.analyze_errors(&self.root).await)
    }

    pub fn get_language_dependencies(&self, language: &str) -> ArgusResult<Vec<DependencyInfo>> {
        Ok(self.plugin(language)?.dependencies(&self.root))
    }

    pub async fn find_language_services(&self, language: &str) -> ArgusResult<Vec<ServiceInfo>> {
        let plugin = self.plugin(language)?;
        Ok(plugin.find_services(&self.root).await)
    }

    pub async fn run_language_linter(&self, language: &str) -> ArgusResult<Vec<ErrorInfo>> {
        let plugin = self.plugin(language)?;
        Ok(plugin.run_linter(&self.root).await)
    }

    /// Runs the language's test runner. Unlike the other calls this fails
    /// when there is nothing to run.
    pub async fn run_language_tests(&self, language: &str) -> ArgusResult<TestResults> {
        let plugin = self.plugin(language)?;
        Ok(plugin.run_tests(&self.root).await?)
    }

    /// Polls every watcher once and assembles a snapshot without starting
    /// the daemon.
    pub async fn snapshot_once(&self) -> ProjectSnapshot {
        snapshot::build_once(
            &self.root,
            &self.settings,
            Arc::clone(&self.registry),
            self.ctx.clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings_for(root: &Path) -> Settings {
        Settings {
            workspace_root: Some(root.to_path_buf()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_missing_workspace_is_invalid() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = Workspace::open(settings_for(&missing)).unwrap_err();
        assert!(matches!(err, ArgusError::WorkspaceInvalid { ref path } if *path == missing));
    }

    #[test]
    fn test_file_is_not_a_workspace() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            Workspace::open(settings_for(&file)),
            Err(ArgusError::WorkspaceInvalid { .. })
        ));
    }

    #[test]
    fn test_root_is_canonical() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let workspace = Workspace::open(settings_for(&dir.path().join("sub/.."))).unwrap();
        assert_eq!(workspace.root(), dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_unknown_language() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::open(settings_for(dir.path())).unwrap();
        let err = workspace.analyze_language_errors("cobol").await.unwrap_err();
        assert!(matches!(err, ArgusError::LanguageNotFound { .. }));
        assert!(workspace.get_language_dependencies("").is_err());
    }
}
