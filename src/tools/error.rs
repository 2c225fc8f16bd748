//! Failures of a single external tool invocation.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool '{program}' not found on PATH")]
    NotFound { program: String },

    #[error("Tool '{program}' timed out after {limit:?}")]
    Timeout { program: String, limit: Duration },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Absent and timed-out tools both mean "no result from this check".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ToolError::NotFound { .. } | ToolError::Timeout { .. })
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
