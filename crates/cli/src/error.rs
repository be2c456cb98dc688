use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "cannot run this command while pf9-hostagent and/or pf9-nodeletd is running; stop them before retrying"
    )]
    AgentsRunning,

    #[error(transparent)]
    Config(#[from] nodelet_config::Error),

    #[error("invalid duration {0:?}: {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid phase index number: {0}")]
    InvalidPhaseIndex(usize),

    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    #[error(transparent)]
    Nodelet(#[from] nodelet::Error),

    #[error("Platform9 Kubernetes stack is not running")]
    NotRunning,

    #[error(transparent)]
    Step(#[from] nodelet::StepError),
}
