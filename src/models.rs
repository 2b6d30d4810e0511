// Core data structures for trendscope

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::normalize_whitespace;

/// Topic label used for papers that carry no category tags
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Paper metadata record as delivered by the ingestion collectors
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub categories: String, // comma-joined tags, e.g. "cs.LG, stat.ML"
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub citations: Vec<String>, // ids of papers this one cites
}

impl PaperRecord {
    /// Create a record with only an id and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the publication date
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.published_date = Some(date);
        self
    }

    /// Set the comma-joined category string
    #[must_use]
    pub fn with_categories(mut self, categories: impl Into<String>) -> Self {
        self.categories = categories.into();
        self
    }

    /// Set the author list
    #[must_use]
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set the ids of cited papers
    #[must_use]
    pub fn with_citations<I, S>(mut self, citations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.citations = citations.into_iter().map(Into::into).collect();
        self
    }

    /// Set the abstract
    #[must_use]
    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    /// Trimmed, non-empty category tags in their original order
    pub fn category_list(&self) -> Vec<&str> {
        self.categories
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// First category tag, or [`UNCATEGORIZED`]
    pub fn primary_category(&self) -> &str {
        self.category_list()
            .first()
            .copied()
            .unwrap_or(UNCATEGORIZED)
    }

    /// Text used for topic modeling: title and abstract joined
    pub fn document_text(&self) -> String {
        if self.abstract_text.trim().is_empty() {
            normalize_whitespace(&self.title)
        } else {
            normalize_whitespace(&format!("{} {}", self.title, self.abstract_text))
        }
    }

    /// Publication year, if dated
    pub fn year(&self) -> Option<i32> {
        self.published_date.map(|d| d.year())
    }
}

/// Load paper records from a JSON array or JSON Lines document
pub fn parse_records(content: &str) -> serde_json::Result<Vec<PaperRecord>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed);
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// Read and parse the paper records stored at `path`
pub fn load_records(path: &Path) -> crate::error::Result<Vec<PaperRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_records(&content)?)
}
