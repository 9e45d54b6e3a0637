use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ollama error: {0}")]
    OllamaError(String),

    #[error("Vector DB error: {0}")]
    VectorDBError(String),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Extraction failed (retryable): {0}")]
    RetryableExtraction(String),

    #[error("Extraction failed: {0}")]
    PermanentExtraction(String),

    #[error("Embedding failed (retryable): {0}")]
    RetryableEmbedding(String),

    #[error("Embedding failed: {0}")]
    PermanentEmbedding(String),
}

impl ExternalError {
    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExternalError::ConnectionError(_)
                | ExternalError::OllamaError(_)
                | ExternalError::Timeout(_)
                | ExternalError::RetryableExtraction(_)
                | ExternalError::RetryableEmbedding(_)
        )
    }
}
