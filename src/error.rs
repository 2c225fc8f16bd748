//! Crate-level error type returned across the public API.

use std::path::PathBuf;
use thiserror::Error;

use crate::plugins::PluginError;

/// Errors surfaced to callers of [`crate::ProjectIntelligence`].
///
/// Tool failures inside a refresh never reach this type; they are absorbed
/// where they happen and only reduce what a snapshot reports.
#[derive(Error, Debug)]
pub enum ArgusError {
    #[error("Workspace '{path}' does not exist or is not a directory")]
    WorkspaceInvalid { path: PathBuf },

    #[error("Language not recognized: {name}")]
    LanguageNotFound { name: String },

    #[error("Snapshot not ready: no refresh has completed yet")]
    NotReady,

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ArgusResult<T> = Result<T, ArgusError>;
