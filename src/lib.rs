//! trendscope - Research trend analytics over paper records
//!
//! Turns a corpus of dated, categorised papers into trend signals and
//! answers questions about them: where activity shifted, which topic
//! overtook which, what the next year looks like, which themes the
//! abstracts cluster into, and who sits at the centre of the
//! collaboration network.
//!
//! # Architecture
//!
//! - [`models`] - Paper records and corpus loading
//! - [`config`] - Configuration management and settings
//! - [`analytics`] - Topic signals, changepoints, crossovers and forecasts
//! - [`embedding`] - Text embedding providers and vector helpers
//! - [`topics`] - Embedding-based topic modeling
//! - [`network`] - Co-authorship and citation graphs
//! - [`report`] - Combined insight report
//! - [`error`] - Unified error types
//! - [`utils`] - Text helpers and numeric optimisation
//!
//! # Example
//!
//! ```no_run
//! use trendscope::analytics::{ChangepointDetector, SignalBuilder};
//! use trendscope::config::Config;
//! use trendscope::models::parse_records;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let papers = parse_records(&std::fs::read_to_string("papers.json")?)?;
//!     let detector = ChangepointDetector::new(config.changepoint.clone());
//!     for (topic, series) in SignalBuilder::from_config(&config.signal).build(&papers) {
//!         println!("{topic}: {:?}", detector.detect_series(&series));
//!     }
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod embedding;
pub mod error;
pub mod models;
pub mod network;
pub mod report;
pub mod topics;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{
        ChangepointDetector, CrossoverEvent, Forecaster, SignalBuilder, TimeSeries,
    };
    pub use crate::config::Config;
    pub use crate::embedding::{EmbeddingProvider, HashingEmbedder};
    pub use crate::error::{Error, ErrorCategory, Result, TrendErrorTrait};
    pub use crate::models::PaperRecord;
    pub use crate::network::NetworkAnalyzer;
    pub use crate::report::{InsightReport, ReportBuilder};
    pub use crate::topics::{Document, TopicId, TopicModeler};
}

// Direct re-exports for convenience
pub use models::PaperRecord;
