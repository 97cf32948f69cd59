use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagerError {
    #[error("no git repository found")]
    RepositoryNotFound,
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    ProcessTimeout { command: String, timeout: Duration },
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    ProcessFailure {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("path is outside the expected root: {0}")]
    PathOutsideRoot(String),
    #[error("malformed status record: {0}")]
    ParseAnomaly(String),
    #[error("background task panicked")]
    BackgroundPanic,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StagerError {
    /// message suitable for a transient notification (stderr is shown verbatim)
    pub fn user_message(&self) -> String {
        match self {
            Self::ProcessFailure { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StagerError>;
