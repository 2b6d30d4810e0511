//! Per-topic activity signals built from paper records
//!
//! Papers are bucketed by publication period and topic tag. All series
//! produced by one call share the same period index (global first period to
//! global last period) so they can be compared directly; periods without
//! papers are zero-filled.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::SignalConfig;
use crate::models::{PaperRecord, UNCATEGORIZED};

/// Width of one time-series period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Calendar month, keyed by its first day
    Month,

    /// Calendar year, keyed by January 1st
    Year,
}

impl Granularity {
    /// Parse granularity from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "monthly" | "m" => Some(Self::Month),
            "year" | "yearly" | "annual" | "y" => Some(Self::Year),
            _ => None,
        }
    }

    /// Get string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Start date of the period containing `date`
    #[must_use]
    pub fn period_of(&self, date: NaiveDate) -> NaiveDate {
        let (year, month) = match self {
            Self::Month => (date.year(), date.month()),
            Self::Year => (date.year(), 1),
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
    }

    /// Start date of the period `steps` periods after `period`
    #[must_use]
    pub fn advance(&self, period: NaiveDate, steps: u32) -> Option<NaiveDate> {
        match self {
            Self::Month => period.checked_add_months(Months::new(steps)),
            Self::Year => {
                let year = period.year().checked_add(i32::try_from(steps).ok()?)?;
                NaiveDate::from_ymd_opt(year, 1, 1)
            }
        }
    }
}

/// Which category tags of a paper count toward topic series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicMode {
    /// Only the first tag of the comma-joined category string
    PrimaryCategory,

    /// Every tag; a paper contributes to several series
    AllCategories,
}

/// Ordered (period, value) sequence with strictly increasing periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Period width
    pub granularity: Granularity,

    /// Period start dates, strictly increasing
    pub periods: Vec<NaiveDate>,

    /// Observed value per period
    pub values: Vec<f64>,
}

impl TimeSeries {
    /// Create a series from parallel period and value vectors
    ///
    /// Returns `None` if the lengths differ or periods are not strictly increasing.
    #[must_use]
    pub fn new(granularity: Granularity, periods: Vec<NaiveDate>, values: Vec<f64>) -> Option<Self> {
        if periods.len() != values.len() || periods.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        Some(Self {
            granularity,
            periods,
            values,
        })
    }

    /// Create a contiguous series starting at the period containing `start`
    #[must_use]
    pub fn from_values(granularity: Granularity, start: NaiveDate, values: Vec<f64>) -> Self {
        let first = granularity.period_of(start);
        let periods = (0..values.len())
            .map_while(|i| granularity.advance(first, u32::try_from(i).ok()?))
            .collect::<Vec<_>>();
        let values = values.into_iter().take(periods.len()).collect();
        Self {
            granularity,
            periods,
            values,
        }
    }

    /// Get the number of periods
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the series has no periods
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all values
    #[must_use]
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// The `n` periods following the last one
    #[must_use]
    pub fn next_periods(&self, n: usize) -> Vec<NaiveDate> {
        let Some(&last) = self.periods.last() else {
            return Vec::new();
        };
        (1..=n)
            .map_while(|i| self.granularity.advance(last, u32::try_from(i).ok()?))
            .collect()
    }
}

/// Two series restricted to their shared periods
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub periods: Vec<NaiveDate>,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

/// Restrict two series to the periods they have in common
#[must_use]
pub fn align(a: &TimeSeries, b: &TimeSeries) -> AlignedPair {
    let mut aligned = AlignedPair {
        periods: Vec::new(),
        a: Vec::new(),
        b: Vec::new(),
    };

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a.periods[i].cmp(&b.periods[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                aligned.periods.push(a.periods[i]);
                aligned.a.push(a.values[i]);
                aligned.b.push(b.values[j]);
                i += 1;
                j += 1;
            }
        }
    }

    aligned
}

/// Paper count for one topic in one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFrequency {
    pub year: i32,
    pub topic: String,
    pub frequency: u64,
}

/// Converts paper records into per-topic count series
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    granularity: Granularity,
    topic_mode: TopicMode,
}

impl SignalBuilder {
    /// Create a builder
    #[must_use]
    pub fn new(granularity: Granularity, topic_mode: TopicMode) -> Self {
        Self {
            granularity,
            topic_mode,
        }
    }

    /// Create a builder from configuration
    #[must_use]
    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.granularity, config.topic_mode)
    }

    fn topics_of<'a>(&self, paper: &'a PaperRecord) -> Vec<&'a str> {
        match self.topic_mode {
            TopicMode::PrimaryCategory => vec![paper.primary_category()],
            TopicMode::AllCategories => {
                let mut tags = paper.category_list();
                if tags.is_empty() {
                    tags.push(UNCATEGORIZED);
                }
                // A tag repeated within one paper counts once
                let mut seen = BTreeSet::new();
                tags.retain(|t| seen.insert(*t));
                tags
            }
        }
    }

    /// Build one zero-filled series per topic, keyed by topic name
    ///
    /// Undated papers are skipped. Zero papers yield an empty map.
    pub fn build(&self, papers: &[PaperRecord]) -> BTreeMap<String, TimeSeries> {
        let mut counts: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        let mut first: Option<NaiveDate> = None;
        let mut last: Option<NaiveDate> = None;
        let mut undated = 0usize;

        for paper in papers {
            let Some(date) = paper.published_date else {
                undated += 1;
                continue;
            };
            let period = self.granularity.period_of(date);
            first = Some(first.map_or(period, |f| f.min(period)));
            last = Some(last.map_or(period, |l| l.max(period)));

            for topic in self.topics_of(paper) {
                *counts
                    .entry(topic.to_string())
                    .or_default()
                    .entry(period)
                    .or_insert(0.0) += 1.0;
            }
        }

        if undated > 0 {
            tracing::debug!(undated, "Skipped papers without a publication date");
        }

        let (Some(first), Some(last)) = (first, last) else {
            return BTreeMap::new();
        };

        let mut index = Vec::new();
        let mut cursor = Some(first);
        while let Some(period) = cursor.filter(|p| *p <= last) {
            index.push(period);
            cursor = self.granularity.advance(period, 1);
        }

        let series: BTreeMap<String, TimeSeries> = counts
            .into_iter()
            .map(|(topic, per_period)| {
                let values = index
                    .iter()
                    .map(|p| per_period.get(p).copied().unwrap_or(0.0))
                    .collect();
                let series = TimeSeries {
                    granularity: self.granularity,
                    periods: index.clone(),
                    values,
                };
                (topic, series)
            })
            .collect();

        tracing::debug!(
            topics = series.len(),
            periods = index.len(),
            granularity = self.granularity.as_str(),
            "Built topic signals"
        );

        series
    }

    /// Build the series of a single topic, if any paper carries it
    pub fn build_topic(&self, papers: &[PaperRecord], topic: &str) -> Option<TimeSeries> {
        self.build(papers).remove(topic)
    }

    /// Paper counts per (year, topic), sorted by year then topic
    pub fn yearly_frequencies(&self, papers: &[PaperRecord]) -> Vec<TopicFrequency> {
        let mut counts: BTreeMap<(i32, String), u64> = BTreeMap::new();
        for paper in papers {
            let Some(year) = paper.year() else { continue };
            for topic in self.topics_of(paper) {
                *counts.entry((year, topic.to_string())).or_insert(0) += 1;
            }
        }

        counts
            .into_iter()
            .map(|((year, topic), frequency)| TopicFrequency {
                year,
                topic,
                frequency,
            })
            .collect()
    }
}

impl Default for SignalBuilder {
    fn default() -> Self {
        Self::from_config(&SignalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn paper(id: &str, d: NaiveDate, cats: &str) -> PaperRecord {
        PaperRecord::new(id, id).with_date(d).with_categories(cats)
    }

    #[test]
    fn test_build_zero_fills_gaps() {
        let papers = vec![
            paper("1", date(2023, 1, 10), "cs.LG"),
            paper("2", date(2023, 1, 20), "cs.LG"),
            paper("3", date(2023, 4, 2), "cs.LG,cs.AI"),
        ];

        let series = SignalBuilder::default().build(&papers);
        let lg = &series["cs.LG"];
        assert_eq!(lg.len(), 4);
        assert_eq!(lg.values, vec![2.0, 0.0, 0.0, 1.0]);
        assert_eq!(lg.periods[0], date(2023, 1, 1));
        assert!(!series.contains_key("cs.AI"));
    }

    #[test]
    fn test_all_categories_mode_shares_index() {
        let papers = vec![
            paper("1", date(2023, 1, 10), "cs.LG"),
            paper("2", date(2023, 3, 20), "cs.AI, cs.LG"),
        ];

        let builder = SignalBuilder::new(Granularity::Month, TopicMode::AllCategories);
        let series = builder.build(&papers);
        assert_eq!(series["cs.AI"].values, vec![0.0, 0.0, 1.0]);
        assert_eq!(series["cs.LG"].values, vec![1.0, 0.0, 1.0]);
        assert_eq!(series["cs.AI"].periods, series["cs.LG"].periods);
    }

    #[test]
    fn test_empty_input_yields_empty_map() {
        assert!(SignalBuilder::default().build(&[]).is_empty());
    }

    #[test]
    fn test_uncategorized_and_yearly() {
        let papers = vec![
            paper("1", date(2021, 5, 1), ""),
            paper("2", date(2022, 5, 1), ""),
        ];
        let builder = SignalBuilder::new(Granularity::Year, TopicMode::PrimaryCategory);
        let series = builder.build(&papers);
        assert_eq!(series[UNCATEGORIZED].values, vec![1.0, 1.0]);
        assert_eq!(series[UNCATEGORIZED].periods[1], date(2022, 1, 1));
    }

    #[test]
    fn test_next_periods_crosses_year() {
        let series = TimeSeries::from_values(Granularity::Month, date(2023, 11, 5), vec![1.0, 2.0]);
        assert_eq!(series.next_periods(2), vec![date(2024, 1, 1), date(2024, 2, 1)]);
    }

    #[test]
    fn test_align_overlap() {
        let a = TimeSeries::from_values(Granularity::Year, date(2020, 1, 1), vec![1.0, 2.0, 3.0]);
        let b = TimeSeries::from_values(Granularity::Year, date(2021, 1, 1), vec![5.0, 6.0, 7.0]);
        let pair = align(&a, &b);
        assert_eq!(pair.periods.len(), 2);
        assert_eq!(pair.a, vec![2.0, 3.0]);
        assert_eq!(pair.b, vec![5.0, 6.0]);
    }

    #[test]
    fn test_yearly_frequencies() {
        let papers = vec![
            paper("1", date(2022, 1, 1), "cs.CV"),
            paper("2", date(2022, 6, 1), "cs.CV, cs.LG"),
            paper("3", date(2023, 6, 1), "cs.LG"),
        ];
        let rows = SignalBuilder::default().yearly_frequencies(&papers);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].frequency, 2);
        assert_eq!(rows[1].topic, "cs.LG");
    }

    #[test]
    fn test_new_rejects_unordered_periods() {
        let periods = vec![date(2023, 2, 1), date(2023, 1, 1)];
        assert!(TimeSeries::new(Granularity::Month, periods, vec![1.0, 2.0]).is_none());
    }
}
