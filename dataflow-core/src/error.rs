use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Network failure or non-2xx response from an upstream service.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The query service rejected a submission instead of returning a job.
    #[error("Query submission error: {0}")]
    QuerySubmission(String),

    /// A job or warehouse query reached a failed terminal state.
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Polling timed out after {0:?}")]
    PollTimeout(Duration),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    /// Transient errors may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, EtlError::SourceUnavailable(_))
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            EtlError::NotFound(err.to_string())
        } else {
            EtlError::Io(err.to_string())
        }
    }
}
