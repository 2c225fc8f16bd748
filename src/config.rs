//! Layered configuration for the daemon.
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - `.argus/settings.toml`, found by searching the current directory and its ancestors
//! - Environment variables
//! - CLI argument overrides (applied by the binary after loading)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `ARGUS_` and use double underscores
//! to separate nested levels:
//! - `ARGUS_WATCH__GIT_INTERVAL_SECS=5` sets `watch.git_interval_secs`
//! - `ARGUS_TOOLS__LINT_TIMEOUT_SECS=10` sets `tools.lint_timeout_secs`
//! - `ARGUS_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::ToolTimeouts;

/// Directory holding the configuration file, relative to the workspace root.
pub const CONFIG_DIR: &str = ".argus";
pub const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "ARGUS_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Project directory to observe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub debug: bool,

    /// Watcher cadences and file-walk options
    #[serde(default)]
    pub watch: WatchConfig,

    /// External tool limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Per-language switches, keyed by plugin name
    #[serde(default)]
    pub languages: IndexMap<String, LanguageConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_file_interval")]
    pub file_interval_secs: u64,

    #[serde(default = "default_git_interval")]
    pub git_interval_secs: u64,

    #[serde(default = "default_process_interval")]
    pub process_interval_secs: u64,

    #[serde(default = "default_build_interval")]
    pub build_interval_secs: u64,

    /// Cadence of the quick built-in error probes
    #[serde(default = "default_error_interval")]
    pub error_interval_secs: u64,

    /// Cadence of the full per-language analysis
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    /// Cadence of snapshot assembly
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Upper bound on waiting for fresh watcher output during a refresh
    #[serde(default = "default_refresh_wait")]
    pub refresh_wait_secs: u64,

    /// Age after which a file change drops out of the recent list
    #[serde(default = "default_change_window")]
    pub change_window_secs: u64,

    #[serde(default = "default_max_recent_changes")]
    pub max_recent_changes: usize,

    /// Directory names never descended into
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_lint_timeout")]
    pub lint_timeout_secs: u64,

    #[serde(default = "default_typecheck_timeout")]
    pub typecheck_timeout_secs: u64,

    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    /// Whether analysis may run a project's own build script
    #[serde(default = "default_true")]
    pub run_build_scripts: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LanguageConfig {
    /// Whether this language's plugin is registered
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Logging configuration.
///
/// `RUST_LOG` takes precedence over these settings when set.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `argus::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_file_interval() -> u64 { 5 }
fn default_git_interval() -> u64 { 15 }
fn default_process_interval() -> u64 { 15 }
fn default_build_interval() -> u64 { 20 }
fn default_error_interval() -> u64 { 10 }
fn default_analysis_interval() -> u64 { 60 }
fn default_snapshot_interval() -> u64 { 30 }
fn default_refresh_wait() -> u64 { 120 }
fn default_change_window() -> u64 { 600 }
fn default_max_recent_changes() -> usize { 100 }
fn default_probe_timeout() -> u64 { 10 }
fn default_lint_timeout() -> u64 { 30 }
fn default_typecheck_timeout() -> u64 { 60 }
fn default_build_timeout() -> u64 { 60 }
fn default_test_timeout() -> u64 { 120 }
fn default_log_level() -> String { "warn".to_string() }

fn default_ignore_dirs() -> Vec<String> {
    [
        "node_modules",
        "vendor",
        "target",
        "dist",
        "build",
        "out",
        "coverage",
        "__pycache__",
        "venv",
        "env",
        ".git",
        CONFIG_DIR,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_languages() -> IndexMap<String, LanguageConfig> {
    ["javascript", "typescript", "python", "go", "rust"]
        .iter()
        .map(|name| (name.to_string(), LanguageConfig { enabled: true }))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            watch: WatchConfig::default(),
            tools: ToolsConfig::default(),
            languages: default_languages(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            file_interval_secs: default_file_interval(),
            git_interval_secs: default_git_interval(),
            process_interval_secs: default_process_interval(),
            build_interval_secs: default_build_interval(),
            error_interval_secs: default_error_interval(),
            analysis_interval_secs: default_analysis_interval(),
            snapshot_interval_secs: default_snapshot_interval(),
            refresh_wait_secs: default_refresh_wait(),
            change_window_secs: default_change_window(),
            max_recent_changes: default_max_recent_changes(),
            ignore_dirs: default_ignore_dirs(),
            respect_gitignore: true,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            lint_timeout_secs: default_lint_timeout(),
            typecheck_timeout_secs: default_typecheck_timeout(),
            build_timeout_secs: default_build_timeout(),
            test_timeout_secs: default_test_timeout(),
            run_build_scripts: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

/// Zero would spin a watcher loop; clamp to one second.
fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

impl WatchConfig {
    pub fn file_interval(&self) -> Duration { secs(self.file_interval_secs) }
    pub fn git_interval(&self) -> Duration { secs(self.git_interval_secs) }
    pub fn process_interval(&self) -> Duration { secs(self.process_interval_secs) }
    pub fn build_interval(&self) -> Duration { secs(self.build_interval_secs) }
    pub fn error_interval(&self) -> Duration { secs(self.error_interval_secs) }
    pub fn analysis_interval(&self) -> Duration { secs(self.analysis_interval_secs) }
    pub fn snapshot_interval(&self) -> Duration { secs(self.snapshot_interval_secs) }
    pub fn refresh_wait(&self) -> Duration { secs(self.refresh_wait_secs) }
    pub fn change_window(&self) -> Duration { Duration::from_secs(self.change_window_secs) }
}

impl ToolsConfig {
    pub fn timeouts(&self) -> ToolTimeouts {
        ToolTimeouts {
            probe: secs(self.probe_timeout_secs),
            lint: secs(self.lint_timeout_secs),
            typecheck: secs(self.typecheck_timeout_secs),
            build: secs(self.build_timeout_secs),
            test: secs(self.test_timeout_secs),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.argus/settings.toml` by searching from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Nearest ancestor of the current directory that holds a `.argus` directory
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Directory to observe: the configured root, else the current directory.
    pub fn resolve_workspace(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Languages absent from the map are enabled.
    pub fn is_language_enabled(&self, name: &str) -> bool {
        self.languages
            .get(name)
            .map(|config| config.enabled)
            .unwrap_or(true)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `root`
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            workspace_root: Some(root.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Ok(config_path)
    }
}
