//! Louvain community detection
//!
//! Multi-level greedy modularity optimisation over edge weights. Nodes are
//! visited in index order and candidate communities in order of first
//! neighbour, so the partition is reproducible. Community ids are dense and
//! numbered by first appearance in node order.

use std::collections::BTreeMap;

use super::graph::{Graph, NodeId};

/// Minimum modularity gain that still counts as progress
const MIN_GAIN: f64 = 1e-7;

/// Weighted undirected multigraph used between Louvain levels
#[derive(Debug, Clone)]
struct Level {
    adjacency: Vec<Vec<(usize, f64)>>,
    loops: Vec<f64>,
    total_weight: f64,
}

impl Level {
    fn from_graph<N: NodeId, A>(graph: &Graph<N, A>) -> Self {
        let n = graph.node_count();
        let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (a, b, w) in graph.edges() {
            *pairs.entry((a.min(b), a.max(b))).or_insert(0.0) += w;
        }
        Self::from_pairs(n, pairs)
    }

    fn from_pairs(n: usize, pairs: BTreeMap<(usize, usize), f64>) -> Self {
        let mut adjacency = vec![Vec::new(); n];
        let mut loops = vec![0.0; n];
        let mut total_weight = 0.0;
        for ((a, b), w) in pairs {
            total_weight += w;
            if a == b {
                loops[a] += w;
            } else {
                adjacency[a].push((b, w));
                adjacency[b].push((a, w));
            }
        }
        for row in &mut adjacency {
            row.sort_by_key(|&(j, _)| j);
        }
        Self {
            adjacency,
            loops,
            total_weight,
        }
    }

    fn len(&self) -> usize {
        self.loops.len()
    }

    /// Weighted degree, self-loops counted twice
    fn strength(&self, i: usize) -> f64 {
        self.adjacency[i].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self.loops[i]
    }

    /// Collapse communities into nodes
    fn induced(&self, communities: &[usize], count: usize) -> Self {
        let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for i in 0..self.len() {
            let ci = communities[i];
            if self.loops[i] > 0.0 {
                *pairs.entry((ci, ci)).or_insert(0.0) += self.loops[i];
            }
            for &(j, w) in &self.adjacency[i] {
                if i < j {
                    let cj = communities[j];
                    *pairs.entry((ci.min(cj), ci.max(cj))).or_insert(0.0) += w;
                }
            }
        }
        Self::from_pairs(count, pairs)
    }
}

/// Running community totals for one level
struct Status {
    node_to_community: Vec<usize>,
    /// Total strength per community
    degrees: Vec<f64>,
    /// Strength per node
    strengths: Vec<f64>,
    /// Internal weight per community
    internals: Vec<f64>,
    total_weight: f64,
}

impl Status {
    fn new(level: &Level) -> Self {
        let strengths: Vec<f64> = (0..level.len()).map(|i| level.strength(i)).collect();
        Self {
            node_to_community: (0..level.len()).collect(),
            degrees: strengths.clone(),
            internals: level.loops.clone(),
            strengths,
            total_weight: level.total_weight,
        }
    }

    fn modularity(&self, resolution: f64) -> f64 {
        let links = self.total_weight;
        if links <= 0.0 {
            return 0.0;
        }
        let mut seen = vec![false; self.degrees.len()];
        let mut result = 0.0;
        for &c in &self.node_to_community {
            if std::mem::replace(&mut seen[c], true) {
                continue;
            }
            result += self.internals[c] * resolution / links - (self.degrees[c] / (2.0 * links)).powi(2);
        }
        result
    }

    fn remove(&mut self, node: usize, community: usize, weight: f64, loops: f64) {
        self.degrees[community] -= self.strengths[node];
        self.internals[community] -= weight + loops;
    }

    fn insert(&mut self, node: usize, community: usize, weight: f64, loops: f64) {
        self.node_to_community[node] = community;
        self.degrees[community] += self.strengths[node];
        self.internals[community] += weight + loops;
    }
}

/// Weight from `node` to each neighbouring community, in first-seen order
fn neighbour_communities(level: &Level, status: &Status, node: usize) -> Vec<(usize, f64)> {
    let mut weights: Vec<(usize, f64)> = Vec::new();
    for &(j, w) in &level.adjacency[node] {
        let c = status.node_to_community[j];
        match weights.iter_mut().find(|(k, _)| *k == c) {
            Some(entry) => entry.1 += w,
            None => weights.push((c, w)),
        }
    }
    weights
}

/// Local moving phase; returns whether any node changed community
fn one_level(level: &Level, status: &mut Status, resolution: f64) -> bool {
    let two_m = 2.0 * status.total_weight;
    if two_m <= 0.0 {
        return false;
    }

    let mut changed_any = false;
    let mut current = status.modularity(resolution);

    loop {
        let mut modified = false;

        for node in 0..level.len() {
            let own = status.node_to_community[node];
            let degc_totw = status.strengths[node] / two_m;
            let neighbours = neighbour_communities(level, status, node);
            let weight_of = |c: usize| {
                neighbours
                    .iter()
                    .find(|(k, _)| *k == c)
                    .map_or(0.0, |(_, w)| *w)
            };

            let remove_cost = -weight_of(own)
                + resolution * (status.degrees[own] - status.strengths[node]) * degc_totw;
            status.remove(node, own, weight_of(own), level.loops[node]);

            let mut best = own;
            let mut best_gain = 0.0;
            for &(community, weight) in &neighbours {
                let gain = remove_cost + weight - resolution * status.degrees[community] * degc_totw;
                if gain > best_gain {
                    best_gain = gain;
                    best = community;
                }
            }

            status.insert(node, best, weight_of(best), level.loops[node]);
            if best != own {
                modified = true;
                changed_any = true;
            }
        }

        let next = status.modularity(resolution);
        if !modified || next - current < MIN_GAIN {
            break;
        }
        current = next;
    }

    changed_any
}

/// Dense ids in order of first appearance
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let renumbered = labels
        .iter()
        .map(|&l| {
            let next = mapping.len();
            *mapping.entry(l).or_insert(next)
        })
        .collect();
    (renumbered, mapping.len())
}

/// Community index of every node, in node index order
#[must_use]
pub fn louvain<N: NodeId, A>(graph: &Graph<N, A>, resolution: f64) -> Vec<usize> {
    let n = graph.node_count();
    let mut level = Level::from_graph(graph);
    if level.total_weight <= 0.0 {
        return (0..n).collect();
    }

    let mut membership: Vec<usize> = (0..n).collect();
    let mut status = Status::new(&level);
    one_level(&level, &mut status, resolution);
    let mut modularity = status.modularity(resolution);
    let mut levels = 1;

    loop {
        let (partition, count) = renumber(&status.node_to_community);
        for m in &mut membership {
            *m = partition[*m];
        }

        level = level.induced(&partition, count);
        status = Status::new(&level);
        one_level(&level, &mut status, resolution);
        let next = status.modularity(resolution);
        if next - modularity < MIN_GAIN {
            break;
        }
        modularity = next;
        levels += 1;
    }

    let (membership, count) = renumber(&membership);
    tracing::debug!(nodes = n, communities = count, levels, modularity, "Louvain complete");
    membership
}

/// Modularity of a partition given as one community index per node
#[must_use]
pub fn modularity<N: NodeId, A>(graph: &Graph<N, A>, communities: &[usize], resolution: f64) -> f64 {
    let level = Level::from_graph(graph);
    let m = level.total_weight;
    if m <= 0.0 || communities.len() != level.len() {
        return 0.0;
    }

    let count = communities.iter().copied().max().map_or(0, |c| c + 1);
    let mut internal = vec![0.0; count];
    let mut degree = vec![0.0; count];
    for i in 0..level.len() {
        let ci = communities[i];
        degree[ci] += level.strength(i);
        internal[ci] += level.loops[i];
        for &(j, w) in &level.adjacency[i] {
            if i < j && communities[j] == ci {
                internal[ci] += w;
            }
        }
    }

    internal
        .iter()
        .zip(&degree)
        .map(|(l, d)| l / m - resolution * (d / (2.0 * m)).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> Graph<u32> {
        let mut g = Graph::undirected();
        for i in 0..6 {
            g.add_node(i, ());
        }
        for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)] {
            g.add_edge_weight(&a, &b, 1.0);
        }
        g
    }

    #[test]
    fn test_two_triangles_split() {
        let g = two_triangles();
        let partition = louvain(&g, 1.0);
        assert_eq!(partition, vec![0, 0, 0, 1, 1, 1]);
        let q = modularity(&g, &partition, 1.0);
        assert!((q - 5.0 / 14.0).abs() < 1e-9, "q = {q}");
    }

    #[test]
    fn test_modularity_single_community_is_zero() {
        let g = two_triangles();
        assert!(modularity(&g, &[0; 6], 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_edgeless_graph_keeps_singletons() {
        let mut g: Graph<u32> = Graph::undirected();
        g.add_node(7, ());
        g.add_node(3, ());
        assert_eq!(louvain(&g, 1.0), vec![0, 1]);
        let empty: Graph<u32> = Graph::undirected();
        assert!(louvain(&empty, 1.0).is_empty());
    }

    #[test]
    fn test_weights_pull_nodes_together() {
        let mut g: Graph<u32> = Graph::undirected();
        for i in 0..4 {
            g.add_node(i, ());
        }
        g.add_edge_weight(&0, &1, 10.0);
        g.add_edge_weight(&2, &3, 10.0);
        g.add_edge_weight(&1, &2, 1.0);
        let partition = louvain(&g, 1.0);
        assert_eq!(partition[0], partition[1]);
        assert_eq!(partition[2], partition[3]);
        assert_ne!(partition[0], partition[2]);
    }
}
