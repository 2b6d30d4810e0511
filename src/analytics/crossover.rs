//! Paradigm-shift detection between two aligned topic series

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analytics::signal::{align, TimeSeries};

/// One series overtaking another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossoverEvent {
    /// Period at which the sign change starts (index `i` of the pair `i, i + 1`)
    pub date: NaiveDate,

    /// Index `i` of the pair `i, i + 1`
    pub index: usize,

    /// Series that is larger after the crossing
    pub winner_id: String,

    /// Series that is overtaken
    pub loser_id: String,

    /// Absolute difference after the crossing
    pub magnitude: f64,

    /// Human-readable summary
    pub event: String,
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Find every index where the difference `a - b` changes sign
///
/// `dates`, `a` and `b` must share one period index; extra trailing entries
/// of the longer slices are ignored. Fewer than two shared points yield no
/// events.
#[must_use]
pub fn detect_crossovers(
    dates: &[NaiveDate],
    a_id: &str,
    a: &[f64],
    b_id: &str,
    b: &[f64],
) -> Vec<CrossoverEvent> {
    let len = dates.len().min(a.len()).min(b.len());
    if len < 2 {
        return Vec::new();
    }

    let diff: Vec<f64> = a.iter().zip(b).take(len).map(|(x, y)| x - y).collect();

    let events: Vec<CrossoverEvent> = diff
        .windows(2)
        .enumerate()
        .filter(|(_, w)| sign(w[0]) != sign(w[1]))
        .map(|(i, w)| {
            let after = w[1];
            let (winner, loser) = if after > 0.0 { (a_id, b_id) } else { (b_id, a_id) };
            CrossoverEvent {
                date: dates[i],
                index: i,
                winner_id: winner.to_string(),
                loser_id: loser.to_string(),
                magnitude: after.abs(),
                event: format!("{winner} overtook {loser}"),
            }
        })
        .collect();

    tracing::debug!(a = a_id, b = b_id, events = events.len(), "Crossover detection complete");
    events
}

/// Find crossovers between two topic series over their shared periods
#[must_use]
pub fn detect_series_crossovers(
    a_id: &str,
    a: &TimeSeries,
    b_id: &str,
    b: &TimeSeries,
) -> Vec<CrossoverEvent> {
    let pair = align(a, b);
    detect_crossovers(&pair.periods, a_id, &pair.a, b_id, &pair.b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::signal::Granularity;

    fn periods(n: usize) -> Vec<NaiveDate> {
        TimeSeries::from_values(
            Granularity::Year,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            vec![0.0; n],
        )
        .periods
    }

    #[test]
    fn test_single_crossover() {
        let dates = periods(4);
        let events = detect_crossovers(&dates, "A", &[1.0, 1.0, 3.0, 3.0], "B", &[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 1);
        assert_eq!(events[0].date, dates[1]);
        assert_eq!(events[0].winner_id, "A");
        assert_eq!(events[0].loser_id, "B");
        assert_eq!(events[0].magnitude, 1.0);
        assert_eq!(events[0].event, "A overtook B");
    }

    #[test]
    fn test_back_and_forth() {
        let dates = periods(5);
        let events = detect_crossovers(&dates, "A", &[3.0, 1.0, 3.0, 1.0, 1.0], "B", &[2.0; 5]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].winner_id, "B");
        assert_eq!(events[1].winner_id, "A");
        assert!(events.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_touching_zero_counts() {
        let dates = periods(3);
        let events = detect_crossovers(&dates, "A", &[3.0, 2.0, 3.0], "B", &[2.0; 3]);
        assert_eq!(events.len(), 2);
        // Tie after the change goes to B
        assert_eq!(events[0].winner_id, "B");
        assert_eq!(events[0].magnitude, 0.0);
    }

    #[test]
    fn test_too_short() {
        assert!(detect_crossovers(&periods(1), "A", &[1.0], "B", &[2.0]).is_empty());
        assert!(detect_crossovers(&[], "A", &[], "B", &[]).is_empty());
    }

    #[test]
    fn test_series_without_overlap() {
        let a = TimeSeries::from_values(Granularity::Year, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(), vec![1.0, 2.0]);
        let b = TimeSeries::from_values(Granularity::Year, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(), vec![2.0, 1.0]);
        assert!(detect_series_crossovers("A", &a, "B", &b).is_empty());
    }
}
