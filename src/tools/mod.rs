//! External tool plumbing shared by plugins and watchers.
//!
//! Every tool invocation goes through [`ToolRunner`]: existence check first,
//! then a time-bounded run whose child is killed on expiry.

mod error;
pub mod ports;
mod runner;

use std::time::Duration;

pub use error::{ToolError, ToolResult};
pub use ports::{is_port_listening, listening_ports};
pub use runner::{ToolOutput, ToolRunner};

/// Per-category time limits for tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    /// Quick probes such as `git status` or a single syntax check.
    pub probe: Duration,
    pub lint: Duration,
    pub typecheck: Duration,
    pub build: Duration,
    pub test: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(10),
            lint: Duration::from_secs(30),
            typecheck: Duration::from_secs(60),
            build: Duration::from_secs(60),
            test: Duration::from_secs(120),
        }
    }
}
