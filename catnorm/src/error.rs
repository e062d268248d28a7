//! Error types for catnorm
//!
//! `PipelineError` is the error surface of the pipeline and its
//! collaborators. Batch drivers group failures by [`PipelineError::kind`].

use thiserror::Error;

/// Pipeline result type
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Empty or malformed caller arguments (never retried)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Revert target is not part of this session's history
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    /// Folding strategy id is not registered
    #[error("Unknown folding strategy: {0}")]
    UnknownStrategy(String),

    /// AI collaborator failed after its own retry policy
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Session store failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration or strategy registration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stable name used for per-kind error counts
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::StageNotFound(_) => "stage_not_found",
            PipelineError::UnknownStrategy(_) => "unknown_strategy",
            PipelineError::ExternalService(_) => "external_service",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::Config(_) => "config",
        }
    }
}

impl From<catnorm_common::Error> for PipelineError {
    fn from(err: catnorm_common::Error) -> Self {
        match err {
            catnorm_common::Error::Config(msg) => PipelineError::Config(msg),
            catnorm_common::Error::InvalidInput(msg) => PipelineError::InvalidInput(msg),
            other => PipelineError::Persistence(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

impl From<crate::ai::AiError> for PipelineError {
    fn from(err: crate::ai::AiError) -> Self {
        PipelineError::ExternalService(err.to_string())
    }
}
