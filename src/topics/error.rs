//! Error types for topic modeling

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::error::{ErrorCategory, TrendErrorTrait};

/// Result type alias for topic operations
pub type TopicResult<T> = Result<T, TopicError>;

/// Topic modeling errors
#[derive(Debug, Error)]
pub enum TopicError {
    // =========================================================================
    // State Errors
    // =========================================================================
    /// Query issued before any training call
    #[error("Topic model has not been trained")]
    ModelNotTrained,

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// One embedding per document is required
    #[error("Got {documents} documents but {embeddings} embeddings")]
    LengthMismatch { documents: usize, embeddings: usize },

    /// Embedding length differs from the configured dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// NaN or infinite embedding component
    #[error("Embedding for document {index} contains non-finite values")]
    NonFiniteEmbedding { index: usize },

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Embedding provider failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl TrendErrorTrait for TopicError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::ModelNotTrained => true,
            Self::LengthMismatch { .. }
            | Self::DimensionMismatch { .. }
            | Self::NonFiniteEmbedding { .. } => false,
            Self::Embedding(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ModelNotTrained => ErrorCategory::ModelNotTrained,
            Self::LengthMismatch { .. }
            | Self::DimensionMismatch { .. }
            | Self::NonFiniteEmbedding { .. } => ErrorCategory::InvalidInput,
            Self::Embedding(e) => e.category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untrained_is_recoverable() {
        assert!(TopicError::ModelNotTrained.is_recoverable());
        assert_eq!(
            TopicError::ModelNotTrained.category(),
            ErrorCategory::ModelNotTrained
        );
    }

    #[test]
    fn test_error_messages() {
        let err = TopicError::DimensionMismatch {
            expected: 384,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "Embedding dimension mismatch: expected 384, got 12"
        );
    }
}
