//! Domain errors for the dockloop pipeline.
//!
//! Only [`DomainError::FatalStage`] is allowed to halt a run. Target-level and
//! batch-level problems are recorded as data on the run state (see
//! [`TargetFailure`](crate::domain::models::TargetFailure)) and never travel
//! through this type.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-level errors that can occur while driving a pipeline run.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Stage '{stage}' failed fatally: {reason}")]
    FatalStage { stage: String, reason: String },

    #[error("Collaborator '{collaborator}' failed: {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    #[error("Docking backend error: {0}")]
    Backend(String),

    #[error("No persisted run state at {0}")]
    StateNotFound(PathBuf),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl DomainError {
    pub fn fatal(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FatalStage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the run.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalStage { .. })
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
