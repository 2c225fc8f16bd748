//! Machine-readable command output.

pub mod envelope;

pub use envelope::{Envelope, ResultCode, Status};
