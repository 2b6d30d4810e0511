//! Time-series analytics over per-topic activity signals
//!
//! Paper records become per-topic count series ([`signal`]), which feed
//! changepoint detection, crossover detection and forecasting.

pub mod changepoint;
pub mod crossover;
pub mod forecast;
pub mod signal;

pub use changepoint::{Changepoint, ChangepointDetector, ChangepointError, ChangepointType};
pub use crossover::{detect_crossovers, detect_series_crossovers, CrossoverEvent};
pub use forecast::{FittedParams, ForecastError, ForecastResponse, ForecastResult, Forecaster};
pub use signal::{
    align, AlignedPair, Granularity, SignalBuilder, TimeSeries, TopicFrequency, TopicMode,
};
