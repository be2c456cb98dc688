use std::time::Duration;

use thiserror::Error;

/// Result type for conductor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned while talking to the conductor.
#[derive(Debug, Error)]
pub enum Error {
    /// The local hostname could not be determined.
    #[error("failed to get hostname: {0}")]
    Hostname(#[source] nix::Error),

    /// The conductor did not answer with a host.
    #[error("conductor response carried no host")]
    MissingHost,

    /// The conductor rejected or failed the call.
    #[error(transparent)]
    Status(#[from] tonic::Status),

    /// No answer arrived within the deadline.
    #[error("conductor call timed out after {0:?}")]
    Timeout(Duration),

    /// The channel to the conductor could not be set up.
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}
