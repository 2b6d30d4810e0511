//! Unified error handling for the trendscope crate
//!
//! Each analytics component owns a domain error enum. This module wraps them
//! in a single [`Error`] so callers crossing component boundaries can use one
//! type while still branching on the taxonomy:
//!
//! - insufficient data (series shorter than the component minimum)
//! - model not trained (topic queries before training)
//! - non-convergence (iterative algorithms that gave up)
//! - invalid graph input (malformed or dangling references)
//!
//! Components recover from all four locally and hand back an empty or
//! neutral result; the variants exist so that recovery is observable.

use std::io;
use thiserror::Error;

pub use crate::analytics::changepoint::ChangepointError;
pub use crate::analytics::forecast::ForecastError;
pub use crate::embedding::EmbeddingError;
pub use crate::network::GraphError;
pub use crate::topics::TopicError;

/// Common trait for all trendscope error types
pub trait TrendErrorTrait: std::error::Error {
    /// Whether the condition is handled by returning a degraded result
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Input shorter than the component minimum
    InsufficientData,
    /// Query against an untrained model
    ModelNotTrained,
    /// Iterative computation did not converge or failed internally
    NonConvergence,
    /// Malformed input (dangling edges, mismatched lengths, bad dimensions)
    InvalidInput,
    /// Storage and I/O errors
    Storage,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short human-readable label
    pub fn description(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient data",
            Self::ModelNotTrained => "model not trained",
            Self::NonConvergence => "computation did not converge",
            Self::InvalidInput => "invalid input",
            Self::Storage => "storage error",
            Self::Other => "other error",
        }
    }
}

/// Unified error type for the trendscope crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Changepoint error: {0}")]
    Changepoint(#[from] ChangepointError),

    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),

    #[error("Topic model error: {0}")]
    Topic(#[from] TopicError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrendErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Changepoint(e) => e.is_recoverable(),
            Self::Forecast(e) => e.is_recoverable(),
            Self::Topic(e) => e.is_recoverable(),
            Self::Graph(e) => e.is_recoverable(),
            Self::Embedding(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Changepoint(e) => e.category(),
            Self::Forecast(e) => e.category(),
            Self::Topic(e) => e.category(),
            Self::Graph(e) => e.category(),
            Self::Embedding(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::InvalidInput,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
