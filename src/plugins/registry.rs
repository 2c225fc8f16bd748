//! Registered plugins, keyed by language name.
//!
//! The set is built once from configuration and never changes afterwards.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::{GoPlugin, JavaScriptPlugin, LanguagePlugin, PluginContext, PythonPlugin, RustPlugin, TypeScriptPlugin};
use crate::error::{ArgusError, ArgusResult};
use crate::types::{DependencyInfo, DetectedLanguage, ErrorInfo, ServiceInfo};
use crate::walker::ProjectWalker;
use crate::Settings;

/// Language name reported when nothing recognizable has any files.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Everything one registry pass learns about a workspace.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LanguageReport {
    pub languages: Vec<DetectedLanguage>,
    pub primary_language: String,
    pub errors: Vec<ErrorInfo>,
    pub dependencies: Vec<DependencyInfo>,
    pub services: Vec<ServiceInfo>,
}

pub struct PluginRegistry {
    plugins: IndexMap<&'static str, Arc<dyn LanguagePlugin>>,
    walker: ProjectWalker,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self::with_context(settings, PluginContext::from_settings(settings))
    }

    /// Registers the built-in plugins in order, skipping disabled languages.
    pub fn with_context(settings: &Settings, ctx: PluginContext) -> Self {
        let mut registry = Self::empty(ctx.walker.clone());
        let builtin: [Arc<dyn LanguagePlugin>; 5] = [
            Arc::new(JavaScriptPlugin::new(ctx.clone())),
            Arc::new(TypeScriptPlugin::new(ctx.clone())),
            Arc::new(PythonPlugin::new(ctx.clone())),
            Arc::new(GoPlugin::new(ctx.clone())),
            Arc::new(RustPlugin::new(ctx)),
        ];
        for plugin in builtin {
            if settings.is_language_enabled(plugin.name()) {
                registry.register(plugin);
            } else {
                crate::debug_event!("registry", "disabled", "{}", plugin.name());
            }
        }
        registry
    }

    pub fn empty(walker: ProjectWalker) -> Self {
        Self {
            plugins: IndexMap::new(),
            walker,
        }
    }

    /// Adds a plugin; a later plugin with the same name replaces the earlier
    /// one but keeps its position.
    pub fn register(&mut self, plugin: Arc<dyn LanguagePlugin>) {
        self.plugins.insert(plugin.name(), plugin);
    }

    /// Case-insensitive lookup.
    pub fn get_plugin(&self, name: &str) -> ArgusResult<Arc<dyn LanguagePlugin>> {
        let wanted = name.trim().to_ascii_lowercase();
        self.plugins
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(&wanted))
            .map(|(_, plugin)| Arc::clone(plugin))
            .ok_or_else(|| ArgusError::LanguageNotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Languages present in the workspace, in registration order.
    ///
    /// One walk counts files for every plugin; a language is present when it
    /// has a config marker at the root or at least one file.
    pub fn detect_languages(&self, root: &Path) -> Vec<DetectedLanguage> {
        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for path in self.walker.files(root) {
            for (name, plugin) in &self.plugins {
                if plugin.descriptor().handles(&path) {
                    *counts.entry(*name).or_default() += 1;
                }
            }
        }

        self.plugins
            .iter()
            .filter_map(|(name, plugin)| {
                let file_count = counts.get(name).copied().unwrap_or(0);
                let config_files = plugin.descriptor().present_config_files(root);
                (file_count > 0 || !config_files.is_empty()).then(|| DetectedLanguage {
                    name: name.to_string(),
                    file_count,
                    config_files,
                })
            })
            .collect()
    }

    /// The detected language with the most files. Ties go to the one
    /// registered first; a workspace with no matching files is `unknown`.
    pub fn primary_language(detected: &[DetectedLanguage]) -> String {
        let mut best: Option<&DetectedLanguage> = None;
        for language in detected.iter().filter(|l| l.file_count > 0) {
            if best.is_none_or(|b| language.file_count > b.file_count) {
                best = Some(language);
            }
        }
        best.map(|l| l.name.clone())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
    }

    fn detected_plugins(&self, detected: &[DetectedLanguage]) -> Vec<Arc<dyn LanguagePlugin>> {
        detected
            .iter()
            .filter_map(|l| self.plugins.get(l.name.as_str()).cloned())
            .collect()
    }

    /// Runs every detected plugin's error analysis and concatenates the
    /// results.
    pub async fn analyze_all_errors(&self, root: &Path) -> Vec<ErrorInfo> {
        let detected = self.detect_languages(root);
        let mut errors = Vec::new();
        for plugin in self.detected_plugins(&detected) {
            errors.extend(plugin.analyze_errors(root).await);
        }
        errors
    }

    /// Full pass over the workspace: detection, errors, dependencies and
    /// services of every detected language.
    ///
    /// Errors are a plain union. Dependencies keep the first entry per
    /// `(name, source)` and services the first per port, since a delegating
    /// plugin reports the same manifest its delegate does.
    pub async fn analyze_workspace(&self, root: &Path) -> LanguageReport {
        let languages = self.detect_languages(root);
        let primary_language = Self::primary_language(&languages);

        let mut report = LanguageReport {
            primary_language,
            ..Default::default()
        };
        let mut seen_deps = HashSet::new();
        let mut seen_ports = HashSet::new();

        for plugin in self.detected_plugins(&languages) {
            let errors = plugin.analyze_errors(root).await;
            crate::debug_event!("registry", "analyzed", "{}: {} findings", plugin.name(), errors.len());
            report.errors.extend(errors);

            for dep in plugin.dependencies(root) {
                if seen_deps.insert((dep.name.clone(), dep.source.clone())) {
                    report.dependencies.push(dep);
                }
            }
            for service in plugin.find_services(root).await {
                if seen_ports.insert(service.port) {
                    report.services.push(service);
                }
            }
        }

        report.languages = languages;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn registry() -> PluginRegistry {
        PluginRegistry::new(&Settings::default())
    }

    #[test]
    fn test_registration_order() {
        assert_eq!(registry().names(), vec!["javascript", "typescript", "python", "go", "rust"]);
    }

    #[test]
    fn test_disabled_language_not_registered() {
        let mut settings = Settings::default();
        settings
            .languages
            .insert("go".to_string(), crate::config::LanguageConfig { enabled: false });
        let registry = PluginRegistry::new(&settings);
        assert_eq!(registry.len(), 4);
        assert!(registry.get_plugin("go").is_err());
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.get_plugin("Python").unwrap().name(), "python");
        assert_eq!(registry.get_plugin(" TYPESCRIPT ").unwrap().name(), "typescript");

        let err = registry.get_plugin("cobol").err().unwrap();
        assert!(matches!(err, ArgusError::LanguageNotFound { ref name } if name == "cobol"));
    }

    #[test]
    fn test_empty_workspace_is_unknown() {
        let dir = TempDir::new().unwrap();
        let detected = registry().detect_languages(dir.path());
        assert!(detected.is_empty());
        assert_eq!(PluginRegistry::primary_language(&detected), UNKNOWN_LANGUAGE);
    }

    #[test]
    fn test_primary_language_by_file_count() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.py"), "y = 2\n").unwrap();
        fs::write(dir.path().join("index.js"), "console.log(1)\n").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        fs::write(dir.path().join("node_modules/dep/index.js"), "").unwrap();
        fs::write(dir.path().join("node_modules/dep/more.js"), "").unwrap();

        let detected = registry().detect_languages(dir.path());
        let names: Vec<&str> = detected.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["javascript", "python"]);
        assert_eq!(detected[0].file_count, 1);
        assert_eq!(PluginRegistry::primary_language(&detected), "python");
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let detected = vec![
            DetectedLanguage {
                name: "javascript".to_string(),
                file_count: 2,
                config_files: vec![],
            },
            DetectedLanguage {
                name: "python".to_string(),
                file_count: 2,
                config_files: vec![],
            },
        ];
        assert_eq!(PluginRegistry::primary_language(&detected), "javascript");
    }

    #[test]
    fn test_config_marker_without_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/x\n\ngo 1.22\n").unwrap();

        let detected = registry().detect_languages(dir.path());
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].config_files, vec!["go.mod".to_string()]);
        assert_eq!(PluginRegistry::primary_language(&detected), UNKNOWN_LANGUAGE);
    }
}
