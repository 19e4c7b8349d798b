use querent_db::RepositoryError;
use thiserror::Error;

use crate::llm::ProviderError;

/// Failure of one agent attempt.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("conversation persistence failed: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("agent made {limit} model calls without reaching an answer")]
    IterationLimit { limit: usize },
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
    /// Carries a status and message meant for the caller verbatim.
    #[error("{message}")]
    UserFacing { status: u16, message: String },
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(error) if error.is_retryable())
    }
}
