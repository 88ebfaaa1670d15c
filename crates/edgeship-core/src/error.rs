//! Error types for edgeship.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("source fetch failed: {0}")]
    Trigger(String),

    #[error("build failed: {message}")]
    Build {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("deploy failed after {} object(s) written: {message}", written.len())]
    Deploy {
        message: String,
        /// Keys confirmed written before the failure.
        written: Vec<String>,
    },

    #[error("invalidation failed: {0}")]
    Invalidation(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn build(message: impl Into<String>) -> Self {
        Error::Build {
            message: message.into(),
            exit_code: None,
        }
    }

    /// Operator-facing classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Trigger(_) | Error::Unauthorized(_) => FailureKind::Trigger,
            Error::Build { .. } => FailureKind::Build,
            Error::Deploy { .. } => FailureKind::Deploy,
            Error::Invalidation(_) => FailureKind::Invalidation,
            Error::Timeout(_) => FailureKind::Timeout,
            Error::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }
}

/// Error taxonomy surfaced per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Source fetch failed (auth, missing branch or revision).
    Trigger,
    /// Build runner exited non-zero or produced no output.
    Build,
    /// Object store write failed, possibly after partial writes.
    Deploy,
    /// Edge cache invalidation failed. Deployed content stays live.
    Invalidation,
    /// An action exceeded its time bound.
    Timeout,
    Cancelled,
    Internal,
}

pub type Result<T> = std::result::Result<T, Error>;
