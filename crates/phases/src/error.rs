use crate::Operation;

use std::process::ExitStatus;

use thiserror::Error;

/// Result type for phase operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by phases and the phase registry.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation was aborted because the caller cancelled it.
    #[error("{0} of phase {1:?} was cancelled")]
    Cancelled(Operation, String),

    /// CPU limit for status checks is outside `(0, 100]`.
    #[error("cpu limit {0} must be greater than 0 and at most 100")]
    InvalidCpuLimit(f64),

    /// Two consecutive phases are not in strictly ascending order.
    #[error("found 2 phases with same or incorrect order: {0:?} ({1}) {2:?} ({3})")]
    InvalidOrder(String, u32, String, u32),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A helper command exited unsuccessfully.
    #[error("{0} exited with {1}")]
    NonZeroExit(&'static str, ExitStatus),

    /// A phase operation failed.
    #[error("failed to {operation} phase {name:?}: {message}")]
    PhaseFailed {
        /// Phase name.
        name: String,

        /// Operation that failed.
        operation: Operation,

        /// Human readable failure detail.
        message: String,
    },
}

impl Error {
    /// Whether the operation was aborted by cancellation rather than failing.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(..))
    }
}
