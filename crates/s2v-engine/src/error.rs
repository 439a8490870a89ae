use thiserror::Error;

use crate::providers::ProviderError;

/// Errors surfaced by pipeline orchestration.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] s2v_storage::StorageError),

    #[error("State error: {0}")]
    State(#[from] s2v_state::StateError),

    #[error("Validation error: {0}")]
    Validation(#[from] s2v_models::ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job timed out after {polls} polls")]
    Timeout { polls: u32 },

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge(msg.into())
    }

    /// Whether a fresh attempt at the failed operation could reasonably
    /// succeed. Validation and configuration problems never clear up on
    /// their own, so retrying them only burns budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Storage(_) => true,
            Self::JobFailed(_) => true,
            Self::Timeout { .. } => true,
            Self::State(_) => false,
            Self::Validation(_) => false,
            Self::Config(_) => false,
            Self::Merge(_) => false,
            Self::Io(_) => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
