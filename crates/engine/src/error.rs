//! Engine error taxonomy.
//!
//! Action failures are deliberately absent from this enum: a non-zero exit
//! code (or any failure raised while a step runs) is recovered at the step
//! boundary into a terminal `failed` state and never escapes as an error.

use thiserror::Error;

use crate::state::Status;

/// Errors surfaced by the engine's public API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or invalid configuration. Fatal at startup, no retry.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// A folder scope other than `workspace` was requested.
    #[error("Unknown folder: {0}")]
    UnknownFolder(String),

    /// The resolved action location uses a scheme the process spawner cannot
    /// consume. Fatal to the affected step only.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// A lifecycle operation was invoked out of sequence. Programmer error.
    #[error("invalid state transition: {operation}() while {status}")]
    InvalidTransition {
        /// The operation that was attempted.
        operation: &'static str,
        /// The status the entity was in at the time.
        status: Status,
    },

    /// Filesystem or subprocess I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
