//! Adjacency-map graphs with generic node ids
//!
//! Nodes keep their insertion index; adjacency maps are ordered by that
//! index so every traversal is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use super::GraphError;
use crate::models::PaperRecord;

/// Bounds every node id type must satisfy
pub trait NodeId: Clone + Eq + Hash + Ord + fmt::Debug {}

impl<T: Clone + Eq + Hash + Ord + fmt::Debug> NodeId for T {}

/// Weighted graph over node ids `N` with per-node attributes `A`
#[derive(Debug, Clone)]
pub struct Graph<N, A = ()> {
    directed: bool,
    nodes: Vec<N>,
    attributes: Vec<A>,
    index: HashMap<N, usize>,
    outgoing: Vec<BTreeMap<usize, f64>>,
    incoming: Vec<BTreeMap<usize, f64>>,
}

impl<N: NodeId, A> Graph<N, A> {
    /// Create an empty undirected graph
    #[must_use]
    pub fn undirected() -> Self {
        Self::with_direction(false)
    }

    /// Create an empty directed graph
    #[must_use]
    pub fn directed() -> Self {
        Self::with_direction(true)
    }

    fn with_direction(directed: bool) -> Self {
        Self {
            directed,
            nodes: Vec::new(),
            attributes: Vec::new(),
            index: HashMap::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Insert a node if absent; returns its index
    pub fn add_node(&mut self, id: N, attribute: A) -> usize {
        if let Some(&i) = self.index.get(&id) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(id.clone(), i);
        self.nodes.push(id);
        self.attributes.push(attribute);
        self.outgoing.push(BTreeMap::new());
        self.incoming.push(BTreeMap::new());
        i
    }

    /// Index of `id`, if present
    pub fn node_index(&self, id: &N) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &N) -> bool {
        self.index.contains_key(id)
    }

    /// Node ids in insertion order
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn node(&self, i: usize) -> &N {
        &self.nodes[i]
    }

    pub fn attribute(&self, id: &N) -> Option<&A> {
        self.node_index(id).map(|i| &self.attributes[i])
    }

    pub fn attribute_mut(&mut self, id: &N) -> Option<&mut A> {
        self.node_index(id).map(move |i| &mut self.attributes[i])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of edges (undirected edges counted once)
    pub fn edge_count(&self) -> usize {
        let total: usize = self.outgoing.iter().map(BTreeMap::len).sum();
        if self.directed {
            total
        } else {
            let loops = (0..self.nodes.len())
                .filter(|&i| self.outgoing[i].contains_key(&i))
                .count();
            (total + loops) / 2
        }
    }

    fn link(&mut self, a: usize, b: usize, weight: f64, accumulate: bool) {
        let put = |map: &mut BTreeMap<usize, f64>, key: usize| {
            let entry = map.entry(key).or_insert(0.0);
            *entry = if accumulate { *entry + weight } else { weight };
        };
        put(&mut self.outgoing[a], b);
        if self.directed {
            put(&mut self.incoming[b], a);
        } else if a != b {
            put(&mut self.outgoing[b], a);
        }
    }

    /// Add `weight` to the edge between two existing nodes, creating it if needed
    ///
    /// Returns `false` when either node is missing.
    pub fn add_edge_weight(&mut self, a: &N, b: &N, weight: f64) -> bool {
        match (self.node_index(a), self.node_index(b)) {
            (Some(i), Some(j)) => {
                self.link(i, j, weight, true);
                true
            }
            _ => false,
        }
    }

    /// Set the edge between two existing nodes to `weight`
    pub fn set_edge(&mut self, a: &N, b: &N, weight: f64) -> bool {
        match (self.node_index(a), self.node_index(b)) {
            (Some(i), Some(j)) => {
                self.link(i, j, weight, false);
                true
            }
            _ => false,
        }
    }

    /// Like [`Graph::set_edge`], reporting which endpoint is unknown
    pub fn try_set_edge(&mut self, a: &N, b: &N, weight: f64) -> Result<(), GraphError> {
        if self.set_edge(a, b, weight) {
            Ok(())
        } else {
            Err(GraphError::DanglingEdge {
                source_id: format!("{a:?}"),
                target_id: format!("{b:?}"),
            })
        }
    }

    /// Weight of the edge `a -> b` (either direction when undirected)
    pub fn edge_weight(&self, a: &N, b: &N) -> Option<f64> {
        let (i, j) = (self.node_index(a)?, self.node_index(b)?);
        self.outgoing[i].get(&j).copied()
    }

    /// Successors of node `i` with edge weights, by index
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.outgoing[i].iter().map(|(&j, &w)| (j, w))
    }

    /// Predecessors of node `i` (the neighbours when undirected)
    pub fn predecessors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let map = if self.directed {
            &self.incoming[i]
        } else {
            &self.outgoing[i]
        };
        map.iter().map(|(&j, &w)| (j, w))
    }

    /// Unweighted degree; in plus out degree when directed
    pub fn degree(&self, i: usize) -> usize {
        if self.directed {
            self.outgoing[i].len() + self.incoming[i].len()
        } else {
            self.outgoing[i].len()
        }
    }

    pub fn out_degree(&self, i: usize) -> usize {
        self.outgoing[i].len()
    }

    pub fn in_degree(&self, i: usize) -> usize {
        if self.directed {
            self.incoming[i].len()
        } else {
            self.outgoing[i].len()
        }
    }

    /// Sum of outgoing edge weights
    pub fn out_strength(&self, i: usize) -> f64 {
        self.outgoing[i].values().sum()
    }

    /// Every edge once as `(source, target, weight)` by index
    pub fn edges(&self) -> Vec<(usize, usize, f64)> {
        self.outgoing
            .iter()
            .enumerate()
            .flat_map(|(i, map)| {
                map.iter()
                    .filter(move |(j, _)| self.directed || i <= **j)
                    .map(move |(&j, &w)| (i, j, w))
            })
            .collect()
    }
}

/// Author node attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorNode {
    /// Number of papers the author appears on
    pub paper_count: u64,
}

/// Paper node attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperNode {
    pub title: String,
}

/// Undirected co-authorship graph; edge weight = shared papers
pub type CoauthorGraph = Graph<String, AuthorNode>;

/// Directed citation graph, citing -> cited
pub type CitationGraph = Graph<String, PaperNode>;

/// Build the co-authorship graph
///
/// Every paper adds one to the weight of each pair of its authors. Blank
/// names and repeats within a paper are ignored.
#[must_use]
pub fn coauthorship_graph(papers: &[PaperRecord]) -> CoauthorGraph {
    let mut graph = CoauthorGraph::undirected();

    for paper in papers {
        let mut seen = BTreeSet::new();
        let authors: Vec<String> = paper
            .authors
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty() && seen.insert(*a))
            .map(str::to_string)
            .collect();

        for author in &authors {
            graph.add_node(author.clone(), AuthorNode::default());
            if let Some(node) = graph.attribute_mut(author) {
                node.paper_count += 1;
            }
        }

        for (i, a) in authors.iter().enumerate() {
            for b in &authors[i + 1..] {
                graph.add_edge_weight(a, b, 1.0);
            }
        }
    }

    tracing::debug!(
        authors = graph.node_count(),
        edges = graph.edge_count(),
        "Built co-authorship graph"
    );
    graph
}

/// Citation graph plus the number of references that could not be linked
#[derive(Debug, Clone)]
pub struct CitationBuild {
    pub graph: CitationGraph,

    /// Citations to unknown papers or to the citing paper itself
    pub skipped_edges: usize,
}

/// Build the citation graph from the papers' reference lists
///
/// Nodes are the supplied papers (blank ids skipped, first occurrence of a
/// repeated id wins). A reference becomes an edge only when it points to
/// another supplied paper.
#[must_use]
pub fn citation_graph(papers: &[PaperRecord]) -> CitationBuild {
    let mut graph = CitationGraph::directed();

    for paper in papers {
        let id = paper.id.trim();
        if id.is_empty() {
            continue;
        }
        graph.add_node(
            id.to_string(),
            PaperNode {
                title: paper.title.clone(),
            },
        );
    }

    let mut skipped_edges = 0;
    for paper in papers {
        let citing = paper.id.trim().to_string();
        if citing.is_empty() {
            skipped_edges += paper.citations.len();
            continue;
        }
        for cited in &paper.citations {
            let cited = cited.trim().to_string();
            if cited == citing {
                skipped_edges += 1;
                continue;
            }
            if let Err(e) = graph.try_set_edge(&citing, &cited, 1.0) {
                tracing::debug!(error = %e, "Skipping citation");
                skipped_edges += 1;
            }
        }
    }

    if skipped_edges > 0 {
        tracing::warn!(skipped_edges, "Skipped citations that do not resolve to a supplied paper");
    }
    tracing::debug!(
        papers = graph.node_count(),
        citations = graph.edge_count(),
        "Built citation graph"
    );

    CitationBuild {
        graph,
        skipped_edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, authors: &[&str]) -> PaperRecord {
        PaperRecord::new(id, format!("Paper {id}")).with_authors(authors.iter().copied())
    }

    #[test]
    fn test_coauthor_clique_weights() {
        let papers = vec![
            paper("1", &["Ada", "Ben", "Cy"]),
            paper("2", &["Ada", "Ben"]),
        ];
        let graph = coauthorship_graph(&papers);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.edge_weight(&"Ada".into(), &"Ben".into()), Some(2.0));
        assert_eq!(graph.edge_weight(&"Ben".into(), &"Ada".into()), Some(2.0));
        assert_eq!(graph.edge_weight(&"Ada".into(), &"Cy".into()), Some(1.0));
        assert_eq!(graph.attribute(&"Ada".into()).unwrap().paper_count, 2);
        assert_eq!(graph.attribute(&"Cy".into()).unwrap().paper_count, 1);
    }

    #[test]
    fn test_duplicate_and_blank_authors_ignored() {
        let graph = coauthorship_graph(&[paper("1", &["Ada", " Ada ", "", "Ben"])]);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_weight(&"Ada".into(), &"Ben".into()), Some(1.0));
        assert_eq!(graph.edge_weight(&"Ada".into(), &"Ada".into()), None);
        assert_eq!(graph.attribute(&"Ada".into()).unwrap().paper_count, 1);
    }

    #[test]
    fn test_citation_edges_and_skips() {
        let papers = vec![
            PaperRecord::new("a", "A").with_citations(["b", "missing", "a"]),
            PaperRecord::new("b", "B").with_citations(["c"]),
            PaperRecord::new("c", "C"),
        ];
        let build = citation_graph(&papers);
        assert_eq!(build.graph.node_count(), 3);
        assert_eq!(build.graph.edge_count(), 2);
        assert_eq!(build.skipped_edges, 2);

        let b = build.graph.node_index(&"b".to_string()).unwrap();
        assert_eq!(build.graph.in_degree(b), 1);
        assert_eq!(build.graph.out_degree(b), 1);
        assert_eq!(build.graph.attribute(&"c".to_string()).unwrap().title, "C");
    }

    #[test]
    fn test_no_citation_data_is_empty_edge_set() {
        let build = citation_graph(&[PaperRecord::new("a", "A"), PaperRecord::new("b", "B")]);
        assert_eq!(build.graph.node_count(), 2);
        assert_eq!(build.graph.edge_count(), 0);
        assert_eq!(build.skipped_edges, 0);
    }

    #[test]
    fn test_try_set_edge_reports_dangling_reference() {
        let mut graph: Graph<String> = Graph::directed();
        graph.add_node("a".to_string(), ());
        let err = graph
            .try_set_edge(&"a".to_string(), &"zz".to_string(), 1.0)
            .unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge { .. }));
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_edges_listed_once_when_undirected() {
        let graph = coauthorship_graph(&[paper("1", &["A", "B", "C"])]);
        assert_eq!(graph.edges().len(), 3);
    }
}
