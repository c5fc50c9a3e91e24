use std::error::Error as StdError;

use thiserror::Error;

use crate::context::FromTimeout;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The embedding or index service could not be reached or did not answer in time.
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected before it was sent (e.g. empty text).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The service answered successfully but returned fewer vectors than requested.
    #[error("Embedding service returned no vector")]
    EmptyResponse,

    /// An error specific to the underlying provider that doesn't fit other categories.
    #[error("Provider-specific error: {0}")]
    Provider(#[source] Box<dyn StdError + Send + Sync>),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Unavailable(_) | EmbeddingError::RateLimited)
    }
}

impl FromTimeout for EmbeddingError {
    fn from_timeout(message: String) -> Self {
        EmbeddingError::Unavailable(message)
    }
}
