use thiserror::Error;

use crate::tools::ToolError;

/// Failures a plugin reports to its caller.
///
/// Error analysis never returns these; only operations whose result is
/// meaningless without a tool (such as running tests) do.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("{language}: no {manifest} found in workspace")]
    ManifestMissing {
        language: String,
        manifest: String,
    },

    #[error("{language}: manifest defines no test script")]
    NoTestScript { language: String },

    #[error("{language}: no test runner available")]
    NoTestRunner { language: String },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

pub type PluginResult<T> = Result<T, PluginError>;
