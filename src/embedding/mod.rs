//! Text embedding providers
//!
//! Topic modeling consumes one fixed-length vector per document. Where the
//! vectors come from is a swappable capability behind [`EmbeddingProvider`]:
//!
//! - [`HashingEmbedder`]: deterministic feature hashing, no model download
//! - `BertEmbedder` (feature `bert`): sentence-transformer inference via candle

#[cfg(feature = "bert")]
pub mod bert;
pub mod hashing;

#[cfg(feature = "bert")]
pub use bert::{BertConfig, BertEmbedder};
pub use hashing::HashingEmbedder;

use thiserror::Error;

use crate::error::{ErrorCategory, TrendErrorTrait};

/// Dimension of document embeddings consumed by the topic model
pub const EMBEDDING_DIM: usize = 384;

/// Embedding generation errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl TrendErrorTrait for EmbeddingError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Model(_) => ErrorCategory::Other,
            Self::Tokenization(_) | Self::DimensionMismatch { .. } => ErrorCategory::InvalidInput,
        }
    }
}

/// Maps texts to fixed-dimension vectors
pub trait EmbeddingProvider {
    /// Length of every produced vector
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per text in input order
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed `texts` in chunks of `batch_size`
pub fn embed_in_batches<P>(
    provider: &mut P,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError>
where
    P: EmbeddingProvider + ?Sized,
{
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
        let embedded = provider.embed(batch)?;
        if let Some(bad) = embedded.iter().find(|v| v.len() != provider.dimension()) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: provider.dimension(),
                actual: bad.len(),
            });
        }
        vectors.extend(embedded);
        tracing::debug!(batch = batch_index, done = vectors.len(), total = texts.len(), "Embedded batch");
    }

    Ok(vectors)
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Cosine distance `1 - similarity`, in `[0, 2]`
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// L2 normalize a vector in place
pub fn l2_normalize_vec(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert!((cosine_distance(&a, &c) - 1.0).abs() < 1e-6);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 1e-6);
        assert!((cosine_distance(&a, &d) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_l2_normalize_vec() {
        let mut vec = vec![3.0, 4.0];
        l2_normalize_vec(&mut vec);
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    struct Broken;

    impl EmbeddingProvider for Broken {
        fn dimension(&self) -> usize {
            4
        }

        fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
    }

    #[test]
    fn test_batches_check_dimension() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = embed_in_batches(&mut Broken, &texts, 1);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_batches_preserve_order() {
        let texts: Vec<String> = (0..7).map(|i| format!("document number {i} about graphs")).collect();
        let mut embedder = HashingEmbedder::default();
        let batched = embed_in_batches(&mut embedder, &texts, 3).unwrap();
        let whole = embedder.embed(&texts).unwrap();
        assert_eq!(batched, whole);
    }
}
