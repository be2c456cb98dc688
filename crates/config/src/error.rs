use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or converting configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Full retry count must be at least one.
    #[error("full retry count must be at least 1")]
    InvalidFullRetryCount,

    /// Phase retry count must be at least one.
    #[error("phase retry count must be at least 1")]
    InvalidPhaseRetry,

    /// A key held a value that could not be decoded into its field.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// The raw value.
        value: String,
    },

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A kube.env line could not be parsed.
    #[error("malformed kube.env line {0}: {1:?}")]
    KubeEnvSyntax(usize, String),

    /// The reconcile loop interval is below the allowed minimum.
    #[error("loop interval cannot be lower than 30 seconds (got {0})")]
    LoopIntervalTooShort(u64),

    /// A config directory did not contain any YAML file.
    #[error("no config files could be loaded from {0:?}")]
    NoConfigFiles(PathBuf),

    /// The config path does not exist.
    #[error("failed to find config file or directory {0:?}")]
    NotFound(PathBuf),

    /// YAML decode error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
