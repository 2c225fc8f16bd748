//! Command implementations for the CLI.
//!
//! Every command returns the process exit status; JSON goes to stdout and
//! logs to stderr.

pub mod init;
pub mod lang;
pub mod snapshot;
pub mod watch;

use serde::Serialize;

use crate::io::Envelope;

/// Prints `envelope` as JSON and returns its exit status.
pub(crate) fn emit<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<i32> {
    println!("{}", envelope.to_json()?);
    Ok(envelope.exit_code())
}
