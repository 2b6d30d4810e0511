//! Topic modeling over document embeddings
//!
//! Training runs three stages:
//!
//! 1. UMAP-style reduction of every embedding ([`reduce`])
//! 2. HDBSCAN clustering of the reduced vectors ([`cluster`]), which alone
//!    decides which training documents are outliers
//! 3. class-based TF-IDF keywords and representative documents ([`keywords`])
//!
//! Each topic also records a Tukey fence over its members' k-th nearest
//! neighbour distances (cosine). [`TopicModeler::assign`] uses it to reject
//! new embeddings that sit far from every trained document.
//!
//! A [`TopicModeler`] is owned by the caller and holds the trained state.
//! Queries on an untrained modeler return empty results; the `try_*`
//! variants surface [`TopicError::ModelNotTrained`] instead.

pub mod cluster;
pub mod error;
pub mod keywords;
pub mod reduce;

pub use cluster::{hdbscan, Clustering, HdbscanParams};
pub use error::{TopicError, TopicResult};
pub use keywords::{class_tfidf, Keyword};
pub use reduce::{cosine_knn, reduce, UmapParams};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::TopicConfig;
use crate::embedding::{cosine_distance, embed_in_batches, l2_normalize_vec, EmbeddingProvider};
use crate::models::PaperRecord;

/// Topic identifier; the outlier id (-1) never collides with a cluster id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum TopicId {
    /// Documents outside every dense region
    Outlier,

    /// Cluster `n`; 0 is the largest
    Topic(u32),
}

impl TopicId {
    /// Whether this is the outlier id
    #[must_use]
    pub fn is_outlier(&self) -> bool {
        matches!(self, Self::Outlier)
    }
}

impl From<TopicId> for i64 {
    fn from(id: TopicId) -> Self {
        match id {
            TopicId::Outlier => -1,
            TopicId::Topic(n) => i64::from(n),
        }
    }
}

impl TryFrom<i64> for TopicId {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Outlier),
            n => u32::try_from(n)
                .map(Self::Topic)
                .map_err(|_| format!("invalid topic id: {n}")),
        }
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i64::from(*self))
    }
}

/// Document to be modeled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

impl From<&PaperRecord> for Document {
    fn from(paper: &PaperRecord) -> Self {
        Self::new(paper.id.clone(), paper.document_text())
    }
}

/// Summary of one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic_id: TopicId,

    /// Ranked keywords
    pub keywords: Vec<Keyword>,

    /// Top documents by membership probability
    pub representative_paper_ids: Vec<String>,

    /// Number of documents assigned
    pub size: usize,
}

/// Topic of one trained document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub paper_id: String,
    pub topic_id: TopicId,

    /// Soft membership in `[0, 1]`, 0 for outliers
    pub probability: f64,
}

/// Counts from one training call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub documents: usize,
    pub topics: usize,
    pub outliers: usize,
}

#[derive(Debug, Clone)]
struct TrainedState {
    doc_ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    labels: Vec<TopicId>,
    probabilities: Vec<f64>,
    summaries: BTreeMap<TopicId, TopicSummary>,
    fences: BTreeMap<TopicId, f64>,
    neighbors: usize,
}

/// Linear-interpolation quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Upper Tukey fence `Q3 + multiplier * IQR`
fn tukey_fence(values: &[f64], multiplier: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    // Absolute slack keeps float noise on identical distances from tripping it
    q3 + multiplier * (q3 - q1) + 1e-6
}

fn centroid(vectors: &[&Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; first.len()];
    for v in vectors {
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += x;
        }
    }
    for s in &mut sum {
        *s /= vectors.len() as f32;
    }
    sum
}

/// Caller-owned topic model
#[derive(Debug, Clone, Default)]
pub struct TopicModeler {
    config: TopicConfig,
    state: Option<TrainedState>,
}

impl TopicModeler {
    /// Create an untrained modeler
    #[must_use]
    pub fn new(config: TopicConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// Whether a training call has completed
    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn validate(&self, documents: &[Document], embeddings: &[Vec<f32>]) -> TopicResult<()> {
        if documents.len() != embeddings.len() {
            return Err(TopicError::LengthMismatch {
                documents: documents.len(),
                embeddings: embeddings.len(),
            });
        }
        for (index, embedding) in embeddings.iter().enumerate() {
            if embedding.len() != self.config.embedding_dim {
                return Err(TopicError::DimensionMismatch {
                    expected: self.config.embedding_dim,
                    actual: embedding.len(),
                });
            }
            if embedding.iter().any(|x| !x.is_finite()) {
                return Err(TopicError::NonFiniteEmbedding { index });
            }
        }
        Ok(())
    }

    /// Embed documents with `provider`, then train
    pub fn fit_with_provider<P>(
        &mut self,
        documents: &[Document],
        provider: &mut P,
    ) -> TopicResult<TrainingReport>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = embed_in_batches(provider, &texts, self.config.embedding_batch_size)?;
        self.fit(documents, &embeddings)
    }

    /// Train on documents and their embeddings, replacing any earlier state
    pub fn fit(&mut self, documents: &[Document], embeddings: &[Vec<f32>]) -> TopicResult<TrainingReport> {
        self.validate(documents, embeddings)?;

        let normalized: Vec<Vec<f32>> = embeddings
            .iter()
            .map(|e| {
                let mut v = e.clone();
                l2_normalize_vec(&mut v);
                v
            })
            .collect();
        let n = normalized.len();
        let neighbors = self.config.n_neighbors.max(1);

        let reduced = reduce(&normalized, &UmapParams::from(&self.config));
        let clustering = hdbscan(
            &reduced,
            HdbscanParams::new(self.config.min_cluster_size, self.config.min_samples),
        );
        let raw = clustering.labels;
        let probabilities = clustering.probabilities;

        // Renumber by descending size, ties by first member
        let mut sizes: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for (doc, label) in raw.iter().enumerate() {
            if let Some(c) = label {
                let entry = sizes.entry(*c).or_insert((0, doc));
                entry.0 += 1;
            }
        }
        let mut order: Vec<(usize, (usize, usize))> = sizes.into_iter().collect();
        order.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        let rank: BTreeMap<usize, TopicId> = order
            .iter()
            .enumerate()
            .map(|(r, (c, _))| (*c, TopicId::Topic(r as u32)))
            .collect();

        let labels: Vec<TopicId> = raw
            .iter()
            .map(|l| l.and_then(|c| rank.get(&c).copied()).unwrap_or(TopicId::Outlier))
            .collect();

        let summaries = self.summarize(documents, &normalized, &labels, &probabilities);
        let fences = self.topic_fences(&normalized, &labels, neighbors);

        let report = TrainingReport {
            documents: n,
            topics: rank.len(),
            outliers: labels.iter().filter(|l| l.is_outlier()).count(),
        };

        tracing::info!(
            documents = report.documents,
            topics = report.topics,
            outliers = report.outliers,
            "Topic model trained"
        );

        self.state = Some(TrainedState {
            doc_ids: documents.iter().map(|d| d.id.clone()).collect(),
            embeddings: normalized,
            labels,
            probabilities,
            summaries,
            fences,
            neighbors,
        });

        Ok(report)
    }

    /// Per-topic fence over members' k-th nearest training distances
    fn topic_fences(
        &self,
        embeddings: &[Vec<f32>],
        labels: &[TopicId],
        neighbors: usize,
    ) -> BTreeMap<TopicId, f64> {
        let kth = cosine_knn(embeddings, neighbors).kth_distances();
        let mut members: BTreeMap<TopicId, Vec<f64>> = BTreeMap::new();
        for (label, distance) in labels.iter().zip(kth) {
            if !label.is_outlier() {
                members.entry(*label).or_default().push(distance);
            }
        }
        members
            .into_iter()
            .map(|(id, distances)| (id, tukey_fence(&distances, self.config.outlier_fence)))
            .collect()
    }

    fn summarize(
        &self,
        documents: &[Document],
        embeddings: &[Vec<f32>],
        labels: &[TopicId],
        probabilities: &[f64],
    ) -> BTreeMap<TopicId, TopicSummary> {
        let mut members: BTreeMap<TopicId, Vec<usize>> = BTreeMap::new();
        for (doc, label) in labels.iter().enumerate() {
            members.entry(*label).or_default().push(doc);
        }

        let texts: BTreeMap<TopicId, Vec<&str>> = members
            .iter()
            .map(|(id, docs)| (*id, docs.iter().map(|&d| documents[d].text.as_str()).collect()))
            .collect();
        let mut keywords = class_tfidf(&texts, self.config.top_n_keywords);

        members
            .into_iter()
            .map(|(id, docs)| {
                let vectors: Vec<&Vec<f32>> = docs.iter().map(|&d| &embeddings[d]).collect();
                let center = centroid(&vectors);

                let mut ranked: Vec<(f64, f32, usize)> = docs
                    .iter()
                    .map(|&d| (probabilities[d], cosine_distance(&embeddings[d], &center), d))
                    .collect();
                ranked.sort_by(|a, b| {
                    b.0.total_cmp(&a.0)
                        .then(a.1.total_cmp(&b.1))
                        .then(a.2.cmp(&b.2))
                });

                let summary = TopicSummary {
                    topic_id: id,
                    keywords: keywords.remove(&id).unwrap_or_default(),
                    representative_paper_ids: ranked
                        .iter()
                        .take(self.config.top_k_documents)
                        .map(|&(_, _, d)| documents[d].id.clone())
                        .collect(),
                    size: docs.len(),
                };
                (id, summary)
            })
            .collect()
    }

    /// Summaries of every topic, outliers first, then by topic id
    pub fn topic_info(&self) -> Vec<TopicSummary> {
        self.state
            .as_ref()
            .map(|s| s.summaries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Ranked keywords of `topic`, or an error when untrained
    pub fn try_topic_keywords(&self, topic: TopicId) -> TopicResult<Vec<Keyword>> {
        let state = self.state.as_ref().ok_or(TopicError::ModelNotTrained)?;
        Ok(state
            .summaries
            .get(&topic)
            .map(|s| s.keywords.clone())
            .unwrap_or_default())
    }

    /// Ranked keywords of `topic`; empty when untrained or unknown
    pub fn topic_keywords(&self, topic: TopicId) -> Vec<Keyword> {
        self.try_topic_keywords(topic).unwrap_or_else(|e| {
            tracing::debug!(error = %e, topic = %topic, "Keyword query returned empty");
            Vec::new()
        })
    }

    /// Representative document ids of `topic`, or an error when untrained
    pub fn try_representative_docs(&self, topic: TopicId) -> TopicResult<Vec<String>> {
        let state = self.state.as_ref().ok_or(TopicError::ModelNotTrained)?;
        Ok(state
            .summaries
            .get(&topic)
            .map(|s| s.representative_paper_ids.clone())
            .unwrap_or_default())
    }

    /// Representative document ids of `topic`; empty when untrained or unknown
    pub fn representative_docs(&self, topic: TopicId) -> Vec<String> {
        self.try_representative_docs(topic).unwrap_or_else(|e| {
            tracing::debug!(error = %e, topic = %topic, "Representative query returned empty");
            Vec::new()
        })
    }

    /// Topic of every trained document, in training order
    pub fn assignments(&self) -> Vec<TopicAssignment> {
        let Some(state) = &self.state else {
            return Vec::new();
        };
        state
            .doc_ids
            .iter()
            .zip(&state.labels)
            .zip(&state.probabilities)
            .map(|((id, topic), p)| TopicAssignment {
                paper_id: id.clone(),
                topic_id: *topic,
                probability: *p,
            })
            .collect()
    }

    /// Membership probability of every trained document
    pub fn probabilities(&self) -> Vec<f64> {
        self.state
            .as_ref()
            .map(|s| s.probabilities.clone())
            .unwrap_or_default()
    }

    /// Assign a new embedding to a trained topic
    ///
    /// The k nearest trained documents vote, ties going to the label with
    /// the nearest member. The embedding is an outlier when the vote picks
    /// the outlier class or its k-th nearest distance lies beyond the fence
    /// of the winning topic.
    pub fn assign(&self, embedding: &[f32]) -> TopicResult<TopicId> {
        let state = self.state.as_ref().ok_or(TopicError::ModelNotTrained)?;
        if embedding.len() != self.config.embedding_dim {
            return Err(TopicError::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(TopicError::NonFiniteEmbedding { index: 0 });
        }
        if state.embeddings.is_empty() {
            return Ok(TopicId::Outlier);
        }

        let mut query = embedding.to_vec();
        l2_normalize_vec(&mut query);

        let mut nearest: Vec<(f64, usize)> = state
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (f64::from(cosine_distance(&query, e)), i))
            .collect();
        nearest.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        nearest.truncate(state.neighbors.min(nearest.len()));

        // label -> (votes, rank of nearest member)
        let mut votes: BTreeMap<TopicId, (usize, usize)> = BTreeMap::new();
        for (rank, &(_, doc)) in nearest.iter().enumerate() {
            let entry = votes.entry(state.labels[doc]).or_insert((0, rank));
            entry.0 += 1;
        }
        let winner = votes
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
            .map_or(TopicId::Outlier, |(id, _)| id);

        let kth = nearest.last().map_or(0.0, |n| n.0);
        match state.fences.get(&winner) {
            Some(&fence) if kth <= fence => Ok(winner),
            _ => Ok(TopicId::Outlier),
        }
    }
}
