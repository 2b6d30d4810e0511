//! Holt-Winters forecasting with additive trend and additive seasonality
//!
//! Initial level, trend and seasonal components are estimated from the first
//! seasonal cycles. The three smoothing weights are then fitted by
//! Nelder-Mead on the one-step-ahead squared error, searching an
//! unconstrained space mapped onto `0 <= beta <= alpha <= 1` and
//! `0 <= gamma <= 1 - alpha`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::signal::TimeSeries;
use crate::config::ForecastConfig;
use crate::error::{ErrorCategory, TrendErrorTrait};
use crate::utils::optimize::nelder_mead;

/// Errors that can occur during forecasting
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Degenerate series: {0}")]
    Degenerate(String),

    #[error("Model fitting failed: {0}")]
    FitFailed(String),
}

impl TrendErrorTrait for ForecastError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InsufficientData { .. } => ErrorCategory::InsufficientData,
            Self::Degenerate(_) | Self::FitFailed(_) => ErrorCategory::NonConvergence,
        }
    }
}

/// Fitted smoothing parameters and initial state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub season_length: usize,
    pub initial_level: f64,
    pub initial_trend: f64,
    pub initial_seasonal: Vec<f64>,
    /// One-step-ahead sum of squared errors
    pub sse: f64,
}

/// Point forecasts for future periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub future_dates: Vec<NaiveDate>,
    pub forecast_values: Vec<f64>,
    pub fitted_params: FittedParams,
}

/// JSON contract: either a forecast or an explicit error marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForecastResponse {
    Forecast(ForecastResult),
    Error { error: String },
}

impl From<Result<ForecastResult, ForecastError>> for ForecastResponse {
    fn from(result: Result<ForecastResult, ForecastError>) -> Self {
        match result {
            Ok(forecast) => Self::Forecast(forecast),
            Err(ForecastError::InsufficientData { .. }) => Self::Error {
                error: "Insufficient data".to_string(),
            },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct InitialState {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
}

impl InitialState {
    /// Level and trend refer to the instant before the first observation
    fn estimate(values: &[f64], m: usize) -> Self {
        let first_mean = values[..m].iter().sum::<f64>() / m as f64;

        let trend = if values.len() >= 2 * m {
            (0..m).map(|i| values[m + i] - values[i]).sum::<f64>() / (m * m) as f64
        } else {
            0.0
        };

        let level = first_mean - trend * (m as f64 + 1.0) / 2.0;
        let seasonal = (0..m)
            .map(|i| values[i] - (level + trend * (i as f64 + 1.0)))
            .collect();

        Self {
            level,
            trend,
            seasonal,
        }
    }
}

/// Final smoothing state after running the recursions over a series
struct Smoothed {
    level: f64,
    trend: f64,
    /// Seasonal terms, index `t + m` holds the term updated at time `t`
    seasonal: Vec<f64>,
    sse: f64,
}

fn smooth(values: &[f64], m: usize, init: &InitialState, alpha: f64, beta: f64, gamma: f64) -> Smoothed {
    let mut level = init.level;
    let mut trend = init.trend;
    let mut seasonal = Vec::with_capacity(values.len() + m);
    seasonal.extend_from_slice(&init.seasonal);
    let mut sse = 0.0;

    for (t, &y) in values.iter().enumerate() {
        let season = seasonal[t];
        let predicted = level + trend + season;
        sse += (y - predicted).powi(2);

        let prev_level = level;
        let prev_trend = trend;
        level = alpha * (y - season) + (1.0 - alpha) * (prev_level + prev_trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * prev_trend;
        seasonal.push(gamma * (y - prev_level - prev_trend) + (1.0 - gamma) * season);
    }

    Smoothed {
        level,
        trend,
        seasonal,
        sse,
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn to_params(u: &[f64; 3]) -> (f64, f64, f64) {
    let alpha = sigmoid(u[0]);
    let beta = alpha * sigmoid(u[1]);
    let gamma = (1.0 - alpha) * sigmoid(u[2]);
    (alpha, beta, gamma)
}

/// Additive Holt-Winters forecaster
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    /// Create a forecaster
    #[must_use]
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Minimum number of observations (one full seasonal cycle)
    #[must_use]
    pub fn min_points(&self) -> usize {
        self.config.season_length
    }

    /// Fit the model to raw values and project `periods` steps ahead
    pub fn forecast_values(
        &self,
        values: &[f64],
        periods: usize,
    ) -> Result<(Vec<f64>, FittedParams), ForecastError> {
        let m = self.config.season_length;
        if m == 0 {
            return Err(ForecastError::Degenerate("season length must be positive".to_string()));
        }
        if values.len() < m {
            return Err(ForecastError::InsufficientData {
                required: m,
                actual: values.len(),
            });
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::Degenerate("series contains non-finite values".to_string()));
        }

        let first = values[0];
        if values.iter().all(|&v| v == first) {
            return Err(ForecastError::Degenerate("series is constant".to_string()));
        }

        let init = InitialState::estimate(values, m);
        let objective = |u: &[f64; 3]| {
            let (alpha, beta, gamma) = to_params(u);
            let sse = smooth(values, m, &init, alpha, beta, gamma).sse;
            if sse.is_finite() {
                sse
            } else {
                f64::MAX
            }
        };

        let (best, _) = nelder_mead(objective, [0.0, -1.0, -1.0], self.config.max_iterations);
        let (alpha, beta, gamma) = to_params(&best);
        let fitted = smooth(values, m, &init, alpha, beta, gamma);

        if !fitted.sse.is_finite() {
            return Err(ForecastError::FitFailed("non-finite fitting error".to_string()));
        }

        let n = values.len();
        let forecast = (1..=periods)
            .map(|h| fitted.level + h as f64 * fitted.trend + fitted.seasonal[n + (h - 1) % m])
            .collect();

        let params = FittedParams {
            alpha,
            beta,
            gamma,
            season_length: m,
            initial_level: init.level,
            initial_trend: init.trend,
            initial_seasonal: init.seasonal,
            sse: fitted.sse,
        };

        Ok((forecast, params))
    }

    /// Forecast a time series `periods` steps ahead (configured horizon when `None`)
    pub fn forecast(
        &self,
        series: &TimeSeries,
        periods: Option<usize>,
    ) -> Result<ForecastResult, ForecastError> {
        let horizon = periods.unwrap_or(self.config.horizon);

        let result = self
            .forecast_values(&series.values, horizon)
            .map(|(forecast_values, fitted_params)| ForecastResult {
                future_dates: series.next_periods(horizon),
                forecast_values,
                fitted_params,
            });

        match &result {
            Ok(forecast) => tracing::debug!(
                series_len = series.len(),
                horizon,
                alpha = forecast.fitted_params.alpha,
                beta = forecast.fitted_params.beta,
                gamma = forecast.fitted_params.gamma,
                "Forecast complete"
            ),
            Err(ForecastError::InsufficientData { required, actual }) => {
                tracing::warn!(required, actual, "Not enough data points for forecasting");
            }
            Err(e) => tracing::error!(error = %e, "Forecasting failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::signal::Granularity;
    use std::f64::consts::PI;

    fn seasonal_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| 10.0 + 0.5 * t as f64 + 3.0 * (2.0 * PI * t as f64 / 12.0).sin())
            .collect()
    }

    fn monthly(values: Vec<f64>) -> TimeSeries {
        TimeSeries::from_values(
            Granularity::Month,
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            values,
        )
    }

    #[test]
    fn test_zero_season_length_is_rejected() {
        let forecaster = Forecaster::new(ForecastConfig {
            season_length: 0,
            ..ForecastConfig::default()
        });
        let result = forecaster.forecast_values(&seasonal_series(24), 6);
        assert!(matches!(result, Err(ForecastError::Degenerate(_))));
    }

    #[test]
    fn test_insufficient_data() {
        let forecaster = Forecaster::default();
        let result = forecaster.forecast(&monthly(vec![1.0, 2.0, 3.0]), None);
        assert!(matches!(
            result,
            Err(ForecastError::InsufficientData { required: 12, actual: 3 })
        ));

        let response = ForecastResponse::from(result);
        assert_eq!(
            response,
            ForecastResponse::Error {
                error: "Insufficient data".to_string()
            }
        );
    }

    #[test]
    fn test_exact_seasonal_trend_is_recovered() {
        let values = seasonal_series(48);
        let truth = seasonal_series(60);
        let result = Forecaster::default().forecast(&monthly(values), None).unwrap();

        assert_eq!(result.forecast_values.len(), 12);
        assert_eq!(result.future_dates.len(), 12);
        assert_eq!(result.future_dates[0], NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        for (h, value) in result.forecast_values.iter().enumerate() {
            assert!((value - truth[48 + h]).abs() < 1e-6, "h={h} value={value}");
        }
        assert!(result.fitted_params.sse < 1e-9);
        assert!((result.fitted_params.initial_trend - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parameters_within_bounds() {
        let mut values = seasonal_series(36);
        for (i, v) in values.iter_mut().enumerate() {
            *v += if i % 3 == 0 { 1.5 } else { -0.7 };
        }
        let (_, params) = Forecaster::default().forecast_values(&values, 6).unwrap();
        assert!((0.0..=1.0).contains(&params.alpha));
        assert!(params.beta >= 0.0 && params.beta <= params.alpha);
        assert!(params.gamma >= 0.0 && params.gamma <= 1.0 - params.alpha);
    }

    #[test]
    fn test_single_cycle_is_enough() {
        let values: Vec<f64> = (0..12).map(|i| (i % 4) as f64 + 1.0).collect();
        let result = Forecaster::default().forecast(&monthly(values), Some(3)).unwrap();
        assert_eq!(result.forecast_values.len(), 3);
        assert!(result.forecast_values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_series_is_degenerate() {
        let result = Forecaster::default().forecast(&monthly(vec![4.0; 24]), None);
        assert!(matches!(result, Err(ForecastError::Degenerate(_))));
        assert!(matches!(
            ForecastResponse::from(result),
            ForecastResponse::Error { .. }
        ));
    }
}
