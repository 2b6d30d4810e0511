//! Statistically validated changepoint detection
//!
//! Segmentation is PELT over an RBF-kernel cost, which reacts to shifts in
//! both mean and spread. Each candidate boundary is then checked with a
//! Welch two-sample t-test between its neighbouring segments and kept only
//! when significant. Kept boundaries are classified by relative change of
//! the segment means.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::HashMap;
use thiserror::Error;

use crate::analytics::signal::TimeSeries;
use crate::config::ChangepointConfig;
use crate::error::{ErrorCategory, TrendErrorTrait};

/// Errors that can occur during changepoint detection
#[derive(Debug, Error)]
pub enum ChangepointError {
    #[error("Insufficient data points: need at least {required}, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Segmentation failed: {0}")]
    NonConvergence(String),
}

impl TrendErrorTrait for ChangepointError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InsufficientData { .. } => ErrorCategory::InsufficientData,
            Self::NonConvergence(_) => ErrorCategory::NonConvergence,
        }
    }
}

/// Kind of regime change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangepointType {
    /// Activity appears from a zero baseline
    Emergence,

    /// More than threefold growth
    Explosion,

    /// Moderate change in either direction
    Shift,

    /// Drop of more than 30%
    Decline,

    /// Change under 10%
    Plateau,
}

impl ChangepointType {
    /// Classify from the relative change alone
    ///
    /// # Classification
    /// - `pct > 2.0`: Explosion
    /// - `pct > 0.5`: Shift
    /// - `pct < -0.3`: Decline
    /// - `|pct| < 0.1`: Plateau
    /// - otherwise: Shift
    #[must_use]
    pub fn from_pct_change(pct: f64) -> Self {
        if pct > 2.0 {
            Self::Explosion
        } else if pct > 0.5 {
            Self::Shift
        } else if pct < -0.3 {
            Self::Decline
        } else if pct.abs() < 0.1 {
            Self::Plateau
        } else {
            Self::Shift
        }
    }

    /// Classify a boundary from the means of the segments around it
    #[must_use]
    pub fn classify(mean_before: f64, mean_after: f64) -> Self {
        if mean_before == 0.0 && mean_after > 0.0 {
            return Self::Emergence;
        }
        Self::from_pct_change(pct_change(mean_before, mean_after))
    }

    /// Get string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergence => "Emergence",
            Self::Explosion => "Explosion",
            Self::Shift => "Shift",
            Self::Decline => "Decline",
            Self::Plateau => "Plateau",
        }
    }
}

/// Relative change between segment means
///
/// A zero baseline maps to 10.0 when activity appears and 0.0 otherwise.
#[must_use]
pub fn pct_change(mean_before: f64, mean_after: f64) -> f64 {
    if mean_before == 0.0 {
        if mean_after > 0.0 {
            10.0
        } else {
            0.0
        }
    } else {
        (mean_after - mean_before) / mean_before
    }
}

/// Validated changepoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changepoint {
    /// Index of the first point of the new segment
    pub index: usize,

    /// Period at `index`
    pub date: NaiveDate,

    /// Classification
    #[serde(rename = "type")]
    pub kind: ChangepointType,

    /// Welch t-test p-value between the neighbouring segments
    pub p_value: f64,

    /// Mean of the segment ending at `index`
    pub mean_before: f64,

    /// Mean of the segment starting at `index`
    pub mean_after: f64,
}

/// RBF kernel segment cost with O(1) queries over a precomputed Gram matrix
#[derive(Debug, Clone)]
pub struct RbfCost {
    n: usize,
    /// 2-D prefix sums of the Gram matrix, (n + 1) x (n + 1)
    prefix: Vec<f64>,
}

impl RbfCost {
    /// Fit the kernel to a signal using the median heuristic for bandwidth
    #[must_use]
    pub fn fit(signal: &[f64]) -> Self {
        let n = signal.len();

        let mut sq_dists = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                sq_dists.push((signal[i] - signal[j]).powi(2));
            }
        }

        let gamma = match median(&mut sq_dists.clone()) {
            Some(m) if m != 0.0 => 1.0 / m,
            _ => 1.0,
        };

        let mut gram = vec![1.0; n * n];
        let mut k = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let scaled = (sq_dists[k] * gamma).clamp(1e-2, 1e2);
                let value = (-scaled).exp();
                gram[i * n + j] = value;
                gram[j * n + i] = value;
                k += 1;
            }
        }

        let stride = n + 1;
        let mut prefix = vec![0.0; stride * stride];
        for i in 0..n {
            for j in 0..n {
                prefix[(i + 1) * stride + (j + 1)] = gram[i * n + j]
                    + prefix[i * stride + (j + 1)]
                    + prefix[(i + 1) * stride + j]
                    - prefix[i * stride + j];
            }
        }

        Self { n, prefix }
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Check if fitted on an empty signal
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Cost of the segment `start..end`
    #[must_use]
    pub fn error(&self, start: usize, end: usize) -> f64 {
        if end <= start {
            return 0.0;
        }
        let stride = self.n + 1;
        let block = self.prefix[end * stride + end] - self.prefix[start * stride + end]
            - self.prefix[end * stride + start]
            + self.prefix[start * stride + start];
        let len = (end - start) as f64;
        len - block / len
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Penalised optimal segmentation with pruning
#[derive(Debug, Clone)]
pub struct Pelt {
    penalty: f64,
    jump: usize,
    min_size: usize,
}

impl Pelt {
    /// Create a segmenter
    #[must_use]
    pub fn new(penalty: f64, jump: usize, min_size: usize) -> Self {
        Self {
            penalty,
            jump: jump.max(1),
            min_size: min_size.max(1),
        }
    }

    /// Segment end indices, the last one always equal to the signal length
    pub fn segment(&self, cost: &RbfCost) -> Result<Vec<usize>, ChangepointError> {
        let n = cost.len();
        if n < self.min_size {
            return Err(ChangepointError::NonConvergence(format!(
                "signal of length {n} is shorter than the minimum segment {}",
                self.min_size
            )));
        }

        let mut candidates: Vec<usize> = (0..n)
            .step_by(self.jump)
            .filter(|&k| k >= self.min_size)
            .collect();
        candidates.push(n);

        // breakpoint -> (total penalised cost, segment ends)
        let mut partitions: HashMap<usize, (f64, Vec<usize>)> = HashMap::new();
        partitions.insert(0, (0.0, Vec::new()));
        let mut admissible: Vec<usize> = Vec::new();

        for &bkp in &candidates {
            let newest = ((bkp - self.min_size) / self.jump) * self.jump;
            admissible.push(newest);

            let subproblems: Vec<(usize, f64)> = admissible
                .iter()
                .filter_map(|&t| {
                    partitions
                        .get(&t)
                        .map(|(c, _)| (t, c + cost.error(t, bkp) + self.penalty))
                })
                .collect();

            let Some(&(best_t, best_cost)) = subproblems
                .iter()
                .min_by(|a, b| a.1.total_cmp(&b.1))
            else {
                return Err(ChangepointError::NonConvergence(format!(
                    "no admissible segmentation ending at {bkp}"
                )));
            };

            if !best_cost.is_finite() {
                return Err(ChangepointError::NonConvergence(format!(
                    "non-finite segmentation cost at {bkp}"
                )));
            }

            let mut ends = partitions
                .get(&best_t)
                .map(|(_, e)| e.clone())
                .unwrap_or_default();
            ends.push(bkp);
            partitions.insert(bkp, (best_cost, ends));

            admissible = subproblems
                .iter()
                .filter(|(_, c)| *c <= best_cost + self.penalty)
                .map(|(t, _)| *t)
                .collect();
        }

        partitions
            .remove(&n)
            .map(|(_, ends)| ends)
            .ok_or_else(|| ChangepointError::NonConvergence("no final partition".to_string()))
    }
}

/// Welch's unequal-variance two-sample t-test, two-sided
///
/// Returns `None` when the p-value is undefined (zero spread and equal means).
#[must_use]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }

    let (m1, v1) = mean_and_variance(a);
    let (m2, v2) = mean_and_variance(b);
    let vn1 = v1 / a.len() as f64;
    let vn2 = v2 / b.len() as f64;
    let denom = (vn1 + vn2).sqrt();

    if denom == 0.0 {
        return if m1 == m2 { None } else { Some(0.0) };
    }

    let mut df = (vn1 + vn2).powi(2)
        / (vn1.powi(2) / (a.len() - 1) as f64 + vn2.powi(2) / (b.len() - 1) as f64);
    if !df.is_finite() || df <= 0.0 {
        df = 1.0;
    }

    let t = (m1 - m2) / denom;
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    Some(p.clamp(0.0, 1.0))
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Segments a series and reports validated, classified changepoints
#[derive(Debug, Clone, Default)]
pub struct ChangepointDetector {
    config: ChangepointConfig,
}

impl ChangepointDetector {
    /// Create a detector
    #[must_use]
    pub fn new(config: ChangepointConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ChangepointConfig {
        &self.config
    }

    /// Detect changepoints, returning typed failures
    ///
    /// `dates` is the period index parallel to `values`; boundaries without a
    /// date are skipped.
    pub fn try_detect(
        &self,
        values: &[f64],
        dates: &[NaiveDate],
    ) -> Result<Vec<Changepoint>, ChangepointError> {
        if values.len() < self.config.min_points {
            return Err(ChangepointError::InsufficientData {
                required: self.config.min_points,
                actual: values.len(),
            });
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(ChangepointError::NonConvergence(
                "series contains non-finite values".to_string(),
            ));
        }

        let cost = RbfCost::fit(values);
        let pelt = Pelt::new(
            self.config.penalty,
            self.config.jump,
            self.config.min_segment_len,
        );
        let ends = pelt.segment(&cost)?;

        let mut changepoints = Vec::new();
        let mut previous = 0;

        // The final end is the series length, not a boundary
        for (pos, &idx) in ends.iter().enumerate().take(ends.len().saturating_sub(1)) {
            let Some(&date) = dates.get(idx) else {
                continue;
            };

            let next = ends.get(pos + 1).copied().unwrap_or(values.len());
            let before = &values[previous..idx];
            let after = &values[idx..next];

            if before.len() > 2 && after.len() > 2 {
                match welch_t_test(before, after) {
                    Some(p_value) if p_value < self.config.alpha => {
                        let mean_before = mean(before);
                        let mean_after = mean(after);
                        changepoints.push(Changepoint {
                            index: idx,
                            date,
                            kind: ChangepointType::classify(mean_before, mean_after),
                            p_value,
                            mean_before,
                            mean_after,
                        });
                    }
                    p_value => {
                        tracing::trace!(index = idx, p_value = ?p_value, "Boundary not significant");
                    }
                }
            }

            previous = idx;
        }

        Ok(changepoints)
    }

    /// Detect changepoints, degrading every failure to an empty list
    pub fn detect(&self, values: &[f64], dates: &[NaiveDate]) -> Vec<Changepoint> {
        match self.try_detect(values, dates) {
            Ok(changepoints) => {
                tracing::debug!(
                    series_len = values.len(),
                    changepoints = changepoints.len(),
                    "Changepoint detection complete"
                );
                changepoints
            }
            Err(ChangepointError::InsufficientData { required, actual }) => {
                tracing::warn!(required, actual, "Not enough data points for changepoint detection");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(error = %e, "Changepoint segmentation failed");
                Vec::new()
            }
        }
    }

    /// Detect changepoints on a time series
    pub fn detect_series(&self, series: &TimeSeries) -> Vec<Changepoint> {
        self.detect(&series.values, &series.periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::signal::Granularity;

    fn monthly(values: Vec<f64>) -> TimeSeries {
        TimeSeries::from_values(
            Granularity::Month,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            values,
        )
    }

    #[test]
    fn test_short_series_is_empty() {
        let detector = ChangepointDetector::default();
        for len in 0..10 {
            let series = monthly(vec![1.0; len]);
            assert!(detector.detect_series(&series).is_empty());
        }
    }

    #[test]
    fn test_step_is_explosion() {
        let mut values = vec![1.0; 20];
        values.extend(vec![5.0; 20]);
        let series = monthly(values);

        let cps = ChangepointDetector::default().detect_series(&series);
        assert_eq!(cps.len(), 1);
        assert_eq!(cps[0].index, 20);
        assert_eq!(cps[0].kind, ChangepointType::Explosion);
        assert!(cps[0].p_value < 0.05);
        assert_eq!(cps[0].date, series.periods[20]);
    }

    #[test]
    fn test_constant_series_has_no_changepoints() {
        let series = monthly(vec![3.0; 30]);
        assert!(ChangepointDetector::default().detect_series(&series).is_empty());
    }

    #[test]
    fn test_emergence_from_zero() {
        let mut values = vec![0.0; 20];
        for _ in 0..5 {
            values.extend([4.0, 5.0, 6.0, 5.0]);
        }
        let cps = ChangepointDetector::default().detect_series(&monthly(values));
        assert_eq!(cps.len(), 1);
        assert_eq!(cps[0].kind, ChangepointType::Emergence);
        assert_eq!(cps[0].mean_before, 0.0);
    }

    #[test]
    fn test_decline() {
        let mut values = vec![10.0; 20];
        values.extend(vec![2.0; 20]);
        let cps = ChangepointDetector::default().detect_series(&monthly(values));
        assert_eq!(cps.len(), 1);
        assert_eq!(cps[0].kind, ChangepointType::Decline);
    }

    #[test]
    fn test_non_finite_degrades_to_empty() {
        let mut values = vec![1.0; 20];
        values[4] = f64::NAN;
        let detector = ChangepointDetector::default();
        assert!(matches!(
            detector.try_detect(&values, &monthly(vec![0.0; 20]).periods),
            Err(ChangepointError::NonConvergence(_))
        ));
        assert!(detector.detect_series(&monthly(values)).is_empty());
    }

    #[test]
    fn test_classification_thresholds_exact() {
        // pct == 2.0 is not yet an explosion
        assert_eq!(ChangepointType::classify(1.0, 3.0), ChangepointType::Shift);
        assert_eq!(ChangepointType::from_pct_change(2.0 + 1e-9), ChangepointType::Explosion);
        assert_eq!(ChangepointType::from_pct_change(2.0 - 1e-9), ChangepointType::Shift);

        // pct == 0.5 falls through to the final Shift rule
        assert_eq!(ChangepointType::classify(2.0, 3.0), ChangepointType::Shift);
        assert_eq!(ChangepointType::from_pct_change(0.5 + 1e-9), ChangepointType::Shift);
        assert_eq!(ChangepointType::from_pct_change(0.5 - 1e-9), ChangepointType::Shift);

        // pct == -0.3 is not yet a decline
        assert_eq!(ChangepointType::classify(10.0, 7.0), ChangepointType::Shift);
        assert_eq!(ChangepointType::from_pct_change(-0.3 - 1e-9), ChangepointType::Decline);
        assert_eq!(ChangepointType::from_pct_change(-0.3 + 1e-9), ChangepointType::Shift);

        // pct == 0.1 is not yet a plateau
        assert_eq!(ChangepointType::classify(10.0, 11.0), ChangepointType::Shift);
        assert_eq!(ChangepointType::from_pct_change(0.1 - 1e-9), ChangepointType::Plateau);
        assert_eq!(ChangepointType::from_pct_change(-0.1 + 1e-9), ChangepointType::Plateau);
        assert_eq!(ChangepointType::from_pct_change(0.1 + 1e-9), ChangepointType::Shift);
    }

    #[test]
    fn test_zero_baseline_pct() {
        assert_eq!(pct_change(0.0, 3.0), 10.0);
        assert_eq!(pct_change(0.0, 0.0), 0.0);
        assert_eq!(ChangepointType::classify(0.0, 0.0), ChangepointType::Plateau);
        assert_eq!(ChangepointType::classify(0.0, 2.0), ChangepointType::Emergence);
    }

    #[test]
    fn test_welch_matches_reference() {
        // t = -5 with 8 degrees of freedom
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [6.0, 7.0, 8.0, 9.0, 10.0];
        let p = welch_t_test(&a, &b).unwrap();
        assert!((p - 0.001_053).abs() < 5e-5, "p = {p}");

        assert_eq!(welch_t_test(&[1.0, 1.0, 1.0], &[5.0, 5.0, 5.0]), Some(0.0));
        assert_eq!(welch_t_test(&[2.0, 2.0, 2.0], &[2.0, 2.0, 2.0]), None);
    }

    #[test]
    fn test_rbf_cost_constant_segment() {
        let cost = RbfCost::fit(&[1.0, 1.0, 1.0, 5.0, 5.0, 5.0]);
        // Identical points are clipped to exp(-0.01)
        let expected = 2.0 * (1.0 - (-0.01f64).exp());
        assert!((cost.error(0, 3) - expected).abs() < 1e-9);
        assert!(cost.error(0, 6) > cost.error(0, 3) + cost.error(3, 6));
    }

    #[test]
    fn test_pelt_grid() {
        let mut values = vec![0.0; 20];
        values.extend(vec![8.0; 20]);
        let ends = Pelt::new(10.0, 5, 2).segment(&RbfCost::fit(&values)).unwrap();
        assert_eq!(ends, vec![20, 40]);
    }
}
