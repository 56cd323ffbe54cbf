use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to launch worker {binary}: {source}")]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unreadable worker output: {0}")]
    Protocol(#[from] events::DecodeError),

    #[error("Worker exited abnormally: {0}")]
    WorkerFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Create a launch error for the given worker binary.
    pub fn launch(binary: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Launch {
            binary: binary.into(),
            source,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
