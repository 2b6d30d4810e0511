//! Configuration management for trendscope
//!
//! This module handles loading and validating analytics parameters from
//! environment variables and TOML files. Every default reproduces the
//! reference thresholds of the trend engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analytics::signal::{Granularity, TopicMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-topic series construction
    pub signal: SignalConfig,

    /// Changepoint detection
    pub changepoint: ChangepointConfig,

    /// Holt-Winters forecasting
    pub forecast: ForecastConfig,

    /// Topic modeling
    pub topics: TopicConfig,

    /// Network analysis
    pub network: NetworkConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// How paper records become time series
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Period width
    pub granularity: Granularity,

    /// Which category tags count toward a topic
    pub topic_mode: TopicMode,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Month,
            topic_mode: TopicMode::PrimaryCategory,
        }
    }
}

/// Changepoint detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangepointConfig {
    /// PELT penalty per additional segment (higher = fewer segments)
    pub penalty: f64,

    /// Significance level for the Welch t-test
    pub alpha: f64,

    /// Minimum series length before detection is attempted
    pub min_points: usize,

    /// Candidate breakpoints are restricted to multiples of this step
    pub jump: usize,

    /// Minimum number of points in a segment
    pub min_segment_len: usize,
}

impl Default for ChangepointConfig {
    fn default() -> Self {
        Self {
            penalty: 10.0,
            alpha: 0.05,
            min_points: 10,
            jump: 5,
            min_segment_len: 2,
        }
    }
}

/// Forecasting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Seasonal period (12 for monthly data)
    pub season_length: usize,

    /// Default number of future periods
    pub horizon: usize,

    /// Nelder-Mead iteration cap for parameter fitting
    pub max_iterations: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            season_length: 12,
            horizon: 12,
            max_iterations: 500,
        }
    }
}

/// Topic modeling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Expected embedding dimension
    pub embedding_dim: usize,

    /// Reduced dimension
    pub n_components: usize,

    /// Neighbourhood size of the k-NN graph
    pub n_neighbors: usize,

    /// Minimum distance between embedded points
    pub min_dist: f64,

    /// Layout optimisation epochs
    pub n_epochs: usize,

    /// Seed for the reduction layout
    pub seed: u64,

    /// Minimum cluster size for density clustering
    pub min_cluster_size: usize,

    /// Core-distance neighbour count (defaults to `min_cluster_size`)
    pub min_samples: Option<usize>,

    /// Keywords kept per topic
    pub top_n_keywords: usize,

    /// Representative documents kept per topic
    pub top_k_documents: usize,

    /// Tukey fence multiplier applied when assigning new embeddings
    pub outlier_fence: f64,

    /// Texts per embedding batch
    pub embedding_batch_size: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            embedding_dim: crate::embedding::EMBEDDING_DIM,
            n_components: 5,
            n_neighbors: 15,
            min_dist: 0.0,
            n_epochs: 200,
            seed: 42,
            min_cluster_size: 50,
            min_samples: None,
            top_n_keywords: 10,
            top_k_documents: 5,
            outlier_fence: 3.0,
            embedding_batch_size: 100,
        }
    }
}

/// Network analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Betweenness uses at most this many sampled source nodes
    pub betweenness_sample_cap: usize,

    /// Seed for betweenness source sampling
    pub betweenness_seed: u64,

    /// Power iteration cap for eigenvector centrality
    pub eigenvector_max_iter: usize,

    /// Eigenvector convergence tolerance (per node)
    pub eigenvector_tolerance: f64,

    /// PageRank damping factor
    pub pagerank_damping: f64,

    /// PageRank iteration cap
    pub pagerank_max_iter: usize,

    /// PageRank convergence tolerance (per node)
    pub pagerank_tolerance: f64,

    /// Modularity resolution for community detection
    pub resolution: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            betweenness_sample_cap: 100,
            betweenness_seed: 42,
            eigenvector_max_iter: 100,
            eigenvector_tolerance: 1e-6,
            pagerank_damping: 0.85,
            pagerank_max_iter: 100,
            pagerank_tolerance: 1e-6,
            resolution: 1.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let granularity = match std::env::var("TRENDSCOPE_GRANULARITY") {
            Ok(value) => Granularity::parse(&value)
                .with_context(|| format!("Unknown granularity: {value}"))?,
            Err(_) => defaults.signal.granularity,
        };

        let config = Self {
            signal: SignalConfig {
                granularity,
                topic_mode: defaults.signal.topic_mode,
            },
            changepoint: ChangepointConfig {
                penalty: env_or("TRENDSCOPE_CHANGEPOINT_PENALTY", defaults.changepoint.penalty),
                alpha: env_or("TRENDSCOPE_CHANGEPOINT_ALPHA", defaults.changepoint.alpha),
                ..defaults.changepoint
            },
            forecast: ForecastConfig {
                horizon: env_or("TRENDSCOPE_FORECAST_HORIZON", defaults.forecast.horizon),
                ..defaults.forecast
            },
            topics: TopicConfig {
                min_cluster_size: env_or(
                    "TRENDSCOPE_MIN_CLUSTER_SIZE",
                    defaults.topics.min_cluster_size,
                ),
                seed: env_or("TRENDSCOPE_SEED", defaults.topics.seed),
                ..defaults.topics
            },
            network: NetworkConfig {
                betweenness_sample_cap: env_or(
                    "TRENDSCOPE_BETWEENNESS_SAMPLES",
                    defaults.network.betweenness_sample_cap,
                ),
                ..defaults.network
            },
            logging: LoggingConfig {
                level: std::env::var("TRENDSCOPE_LOG_LEVEL")
                    .unwrap_or_else(|_| String::from("info")),
                format: std::env::var("TRENDSCOPE_LOG_FORMAT")
                    .unwrap_or_else(|_| String::from("text")),
            },
        };

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.changepoint.alpha > 0.0 && self.changepoint.alpha < 1.0) {
            anyhow::bail!("changepoint.alpha must be in (0, 1)");
        }

        if self.changepoint.penalty < 0.0 {
            anyhow::bail!("changepoint.penalty must not be negative");
        }

        if self.changepoint.jump == 0 || self.changepoint.min_segment_len == 0 {
            anyhow::bail!("changepoint.jump and changepoint.min_segment_len must be greater than 0");
        }

        if self.forecast.season_length < 2 {
            anyhow::bail!("forecast.season_length must be at least 2");
        }

        if self.topics.min_cluster_size < 2 {
            anyhow::bail!("topics.min_cluster_size must be at least 2");
        }

        if self.topics.n_components == 0 || self.topics.n_neighbors < 2 {
            anyhow::bail!("topics.n_components must be > 0 and topics.n_neighbors >= 2");
        }

        if let Some(min_samples) = self.topics.min_samples {
            if min_samples == 0 {
                anyhow::bail!("topics.min_samples must be greater than 0");
            }
        }

        if !(self.network.pagerank_damping > 0.0 && self.network.pagerank_damping < 1.0) {
            anyhow::bail!("network.pagerank_damping must be in (0, 1)");
        }

        if self.network.resolution <= 0.0 {
            anyhow::bail!("network.resolution must be positive");
        }

        Ok(())
    }
}
