//! Development intelligence daemon.
//!
//! Independent watchers each own one slice of project state (files, git,
//! errors, processes, builds). A coordinator merges their latest output into
//! a [`ProjectSnapshot`] that readers fetch without blocking the watchers.
//! Error, dependency and service discovery are delegated to per-language
//! plugins that run the ecosystem's own tools.

pub mod logging;

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod intelligence;
pub mod io;
pub mod plugins;
pub mod snapshot;
pub mod tools;
pub mod types;
pub mod walker;
pub mod watcher;
pub mod workspace;

pub use config::Settings;
pub use error::{ArgusError, ArgusResult};
pub use intelligence::ProjectIntelligence;
pub use plugins::{LanguagePlugin, PluginRegistry};
pub use types::*;
pub use workspace::Workspace;
