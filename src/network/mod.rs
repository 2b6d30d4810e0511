//! Co-authorship and citation network analysis
//!
//! Graphs are rebuilt from paper records on every call. Centrality is
//! reported for every node with all four measures present; a measure that
//! cannot be computed (empty graph, eigenvector non-convergence) is zero.

pub mod centrality;
pub mod community;
pub mod graph;

pub use centrality::{betweenness_centrality, degree_centrality, eigenvector_centrality, pagerank};
pub use community::{louvain, modularity};
pub use graph::{
    citation_graph, coauthorship_graph, AuthorNode, CitationBuild, CitationGraph, CoauthorGraph,
    Graph, NodeId, PaperNode,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::NetworkConfig;
use crate::error::{ErrorCategory, TrendErrorTrait};
use crate::models::PaperRecord;

/// Graph analysis errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{algorithm} did not converge within {iterations} iterations")]
    NonConvergence {
        algorithm: &'static str,
        iterations: usize,
    },

    #[error("Edge references unknown node: {source_id} -> {target_id}")]
    DanglingEdge { source_id: String, target_id: String },
}

impl TrendErrorTrait for GraphError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NonConvergence { .. } => ErrorCategory::NonConvergence,
            Self::DanglingEdge { .. } => ErrorCategory::InvalidInput,
        }
    }
}

/// Centrality of one node, every value in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CentralityScores {
    pub degree: f64,
    pub betweenness: f64,
    pub eigenvector: f64,
    pub pagerank: f64,
}

/// Selects one centrality measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Degree,
    Betweenness,
    Eigenvector,
    PageRank,
}

impl Measure {
    /// Parse measure from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "degree" => Some(Self::Degree),
            "betweenness" => Some(Self::Betweenness),
            "eigenvector" => Some(Self::Eigenvector),
            "pagerank" => Some(Self::PageRank),
            _ => None,
        }
    }

    fn of(&self, scores: &CentralityScores) -> f64 {
        match self {
            Self::Degree => scores.degree,
            Self::Betweenness => scores.betweenness,
            Self::Eigenvector => scores.eigenvector,
            Self::PageRank => scores.pagerank,
        }
    }
}

/// The `k` highest-scoring nodes by `measure`, ties by node id
pub fn top_nodes<N: NodeId>(
    scores: &BTreeMap<N, CentralityScores>,
    measure: Measure,
    k: usize,
) -> Vec<(N, f64)> {
    let mut ranked: Vec<(N, f64)> = scores
        .iter()
        .map(|(id, s)| (id.clone(), measure.of(s)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

/// Summary of the co-authorship network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoauthorSummary {
    pub nodes: usize,
    pub edges: usize,
    pub centrality: BTreeMap<String, CentralityScores>,
    pub communities: BTreeMap<String, usize>,
    pub modularity: f64,
}

/// Summary of the citation network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationSummary {
    pub nodes: usize,
    pub edges: usize,
    pub skipped_edges: usize,

    /// Papers by citations received, most cited first
    pub most_cited: Vec<(String, usize)>,
}

/// Combined network analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    pub coauthorship: CoauthorSummary,
    pub citations: CitationSummary,
}

/// Builds graphs and computes centrality and communities
#[derive(Debug, Clone, Default)]
pub struct NetworkAnalyzer {
    config: NetworkConfig,
}

impl NetworkAnalyzer {
    /// Create an analyzer
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Build the co-authorship graph
    #[must_use]
    pub fn coauthorship_graph(&self, papers: &[PaperRecord]) -> CoauthorGraph {
        coauthorship_graph(papers)
    }

    /// Build the citation graph
    #[must_use]
    pub fn citation_graph(&self, papers: &[PaperRecord]) -> CitationBuild {
        citation_graph(papers)
    }

    /// All four centrality measures for every node
    pub fn centrality<N: NodeId, A>(&self, graph: &Graph<N, A>) -> BTreeMap<N, CentralityScores> {
        let n = graph.node_count();
        if n == 0 {
            return BTreeMap::new();
        }

        let degree = degree_centrality(graph);
        let betweenness = betweenness_centrality(
            graph,
            self.config.betweenness_sample_cap,
            self.config.betweenness_seed,
        );
        let eigenvector = eigenvector_centrality(
            graph,
            self.config.eigenvector_max_iter,
            self.config.eigenvector_tolerance,
        )
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, nodes = n, "Falling back to zero eigenvector centrality");
            vec![0.0; n]
        });
        let (pagerank, converged) = pagerank(
            graph,
            self.config.pagerank_damping,
            self.config.pagerank_max_iter,
            self.config.pagerank_tolerance,
        );
        if !converged {
            tracing::warn!(
                nodes = n,
                iterations = self.config.pagerank_max_iter,
                "PageRank did not converge, using last iterate"
            );
        }

        graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, id)| {
                (
                    id.clone(),
                    CentralityScores {
                        degree: degree[i],
                        betweenness: betweenness[i],
                        eigenvector: eigenvector[i],
                        pagerank: pagerank[i],
                    },
                )
            })
            .collect()
    }

    /// Community id of every node; empty for an empty graph
    pub fn communities<N: NodeId, A>(&self, graph: &Graph<N, A>) -> BTreeMap<N, usize> {
        let partition = louvain(graph, self.config.resolution);
        graph.nodes().iter().cloned().zip(partition).collect()
    }

    /// Modularity of a node-to-community map
    ///
    /// Nodes missing from `partition` each form their own community.
    pub fn modularity<N: NodeId, A>(&self, graph: &Graph<N, A>, partition: &BTreeMap<N, usize>) -> f64 {
        let offset = partition.values().copied().max().map_or(0, |m| m + 1);
        let communities: Vec<usize> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, id)| partition.get(id).copied().unwrap_or(offset + i))
            .collect();
        modularity(graph, &communities, self.config.resolution)
    }

    /// Analyze both networks
    pub fn analyze(&self, papers: &[PaperRecord]) -> NetworkReport {
        let coauthors = self.coauthorship_graph(papers);
        let centrality = self.centrality(&coauthors);
        let communities = self.communities(&coauthors);
        let modularity = self.modularity(&coauthors, &communities);

        let build = self.citation_graph(papers);
        let graph = &build.graph;
        let mut most_cited: Vec<(String, usize)> = (0..graph.node_count())
            .map(|i| (graph.node(i).clone(), graph.in_degree(i)))
            .filter(|(_, count)| *count > 0)
            .collect();
        most_cited.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let report = NetworkReport {
            coauthorship: CoauthorSummary {
                nodes: coauthors.node_count(),
                edges: coauthors.edge_count(),
                centrality,
                communities,
                modularity,
            },
            citations: CitationSummary {
                nodes: graph.node_count(),
                edges: graph.edge_count(),
                skipped_edges: build.skipped_edges,
                most_cited,
            },
        };

        tracing::info!(
            authors = report.coauthorship.nodes,
            collaborations = report.coauthorship.edges,
            papers = report.citations.nodes,
            citations = report.citations.edges,
            "Network analysis complete"
        );
        report
    }
}
