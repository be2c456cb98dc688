use std::path::PathBuf;

use nodelet_phases::{Operation, PhaseStatus};
use thiserror::Error;

/// Result type for the node agent.
pub type Result<T> = std::result::Result<T, Error>;

/// A phase of the chain failed while the chain was being walked.
#[derive(Debug, Error)]
#[error("failed to {operation} phase {index} ({name}): {source}")]
pub struct StepError {
    /// Zero-based position of the phase in the chain.
    pub index: usize,

    /// Phase name.
    pub name: String,

    /// Operation that failed.
    pub operation: Operation,

    /// Error reported by the phase.
    #[source]
    pub source: nodelet_phases::Error,
}

impl StepError {
    /// Whether the walk was interrupted by cancellation rather than a
    /// failing phase.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// Errors returned by the node agent.
#[derive(Debug, Error)]
pub enum Error {
    /// The daemon loop was already started.
    #[error("the daemon has already started")]
    AlreadyStarted,

    /// No asset bundle at the given path.
    #[error("asset bundle {0} does not exist")]
    AssetBundleMissing(PathBuf),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] nodelet_config::Error),

    /// State file error.
    #[error(transparent)]
    ExtensionFile(#[from] nodelet_extension_file::Error),

    /// Phase index outside the chain.
    #[error("phase index {0} is out of range, the chain has {1} phases")]
    InvalidPhaseIndex(usize, usize),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Phase or registry error.
    #[error(transparent)]
    Phase(#[from] nodelet_phases::Error),

    /// A single phase did not reach the expected status.
    #[error("phase {name:?} is {actual}, expected {expected}")]
    PhaseStatus {
        /// Phase name.
        name: String,

        /// Status the operation should have produced.
        expected: PhaseStatus,

        /// Status the phase reported.
        actual: PhaseStatus,
    },

    /// A chain walk stopped at a failing phase.
    #[error(transparent)]
    Step(#[from] StepError),

    /// Conductor error.
    #[error(transparent)]
    Sunpike(#[from] nodelet_sunpike::Error),
}
