use thiserror::Error;

/// Result type for state file operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing the state file.
#[derive(Debug, Error)]
pub enum Error {
    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// JSON encode error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
