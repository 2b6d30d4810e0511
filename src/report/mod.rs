//! Combined research insight report
//!
//! Numeric content comes from the analytics components. A narrative is
//! requested from an injected [`NarrativeProvider`] only when the builder was
//! constructed with `narrative_available = true`; provider failure leaves
//! the narrative empty and never affects the numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analytics::{Changepoint, ChangepointDetector, ChangepointType, SignalBuilder, TopicFrequency};
use crate::config::Config;
use crate::models::PaperRecord;
use crate::utils::truncate_text;

/// Papers per topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

/// Papers per author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub count: usize,
}

/// Topic whose most recent validated shift is upward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergingTopic {
    pub topic: String,
    pub changepoint: Changepoint,
}

/// Insight report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub generated_at: DateTime<Utc>,
    pub paper_count: usize,
    pub top_topics: Vec<TopicCount>,
    pub yearly_frequencies: Vec<TopicFrequency>,
    pub top_authors: Vec<AuthorCount>,
    pub emerging_topics: Vec<EmergingTopic>,

    /// Titles of the most recent papers, newest first, cut to 200 characters
    pub recent_titles: Vec<String>,

    /// Free-text summary from the narrative provider, if any
    pub narrative: Option<String>,
}

/// Optional text-generation collaborator
pub trait NarrativeProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Summarise a report whose numeric fields are already filled in
    fn narrate(&self, report: &InsightReport) -> anyhow::Result<String>;
}

fn ranked_counts(counts: BTreeMap<String, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Assembles [`InsightReport`]s
pub struct ReportBuilder {
    config: Config,
    narrative_available: bool,
    provider: Option<Box<dyn NarrativeProvider>>,
    top_topics: usize,
    top_authors: usize,
    recent_papers: usize,
    max_title_chars: usize,
}

impl ReportBuilder {
    /// Create a builder; narratives are only requested when `narrative_available`
    #[must_use]
    pub fn new(config: Config, narrative_available: bool) -> Self {
        Self {
            config,
            narrative_available,
            provider: None,
            top_topics: 5,
            top_authors: 10,
            recent_papers: 20,
            max_title_chars: 200,
        }
    }

    /// Inject the narrative provider
    #[must_use]
    pub fn with_provider(mut self, provider: Box<dyn NarrativeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Number of topics kept in `top_topics`
    #[must_use]
    pub fn with_top_topics(mut self, n: usize) -> Self {
        self.top_topics = n;
        self
    }

    /// Number of authors kept in `top_authors`
    #[must_use]
    pub fn with_top_authors(mut self, n: usize) -> Self {
        self.top_authors = n;
        self
    }

    /// Build the report
    pub fn build(&self, papers: &[PaperRecord]) -> InsightReport {
        let mut topic_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut author_counts: BTreeMap<String, usize> = BTreeMap::new();
        for paper in papers {
            *topic_counts.entry(paper.primary_category().to_string()).or_insert(0) += 1;

            let mut seen = std::collections::BTreeSet::new();
            for author in paper.authors.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
                if seen.insert(author) {
                    *author_counts.entry(author.to_string()).or_insert(0) += 1;
                }
            }
        }

        let signals = SignalBuilder::from_config(&self.config.signal);
        let detector = ChangepointDetector::new(self.config.changepoint.clone());

        let emerging_topics: Vec<EmergingTopic> = signals
            .build(papers)
            .into_iter()
            .filter_map(|(topic, series)| {
                let latest = detector.detect_series(&series).pop()?;
                matches!(latest.kind, ChangepointType::Emergence | ChangepointType::Explosion).then(|| {
                    EmergingTopic {
                        topic,
                        changepoint: latest,
                    }
                })
            })
            .collect();

        let mut dated: Vec<&PaperRecord> = papers.iter().collect();
        dated.sort_by(|a, b| b.published_date.cmp(&a.published_date));
        let recent_titles = dated
            .iter()
            .take(self.recent_papers)
            .map(|p| truncate_text(&p.title, self.max_title_chars))
            .collect();

        let mut report = InsightReport {
            generated_at: Utc::now(),
            paper_count: papers.len(),
            top_topics: ranked_counts(topic_counts, self.top_topics)
                .into_iter()
                .map(|(topic, count)| TopicCount { topic, count })
                .collect(),
            yearly_frequencies: signals.yearly_frequencies(papers),
            top_authors: ranked_counts(author_counts, self.top_authors)
                .into_iter()
                .map(|(author, count)| AuthorCount { author, count })
                .collect(),
            emerging_topics,
            recent_titles,
            narrative: None,
        };

        report.narrative = self.narrate(&report);

        tracing::info!(
            papers = report.paper_count,
            emerging = report.emerging_topics.len(),
            narrative = report.narrative.is_some(),
            "Insight report built"
        );
        report
    }

    fn narrate(&self, report: &InsightReport) -> Option<String> {
        if !self.narrative_available {
            return None;
        }
        let provider = self.provider.as_ref()?;
        match provider.narrate(report) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Narrative generation failed");
                None
            }
        }
    }
}
