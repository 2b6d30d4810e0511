//! Hierarchical density-based clustering (HDBSCAN)
//!
//! Pipeline: core distances, minimum spanning tree of the mutual
//! reachability graph, single-linkage hierarchy, condensed tree, then
//! excess-of-mass cluster selection. The root is never selected, so a
//! single uniform blob yields noise rather than one all-covering cluster.

use std::collections::{BTreeMap, BTreeSet};

/// Clustering parameters
#[derive(Debug, Clone, Copy)]
pub struct HdbscanParams {
    /// Smallest group that counts as a cluster
    pub min_cluster_size: usize,

    /// Neighbour count (self included) for core distances
    pub min_samples: usize,
}

impl HdbscanParams {
    #[must_use]
    pub fn new(min_cluster_size: usize, min_samples: Option<usize>) -> Self {
        let min_cluster_size = min_cluster_size.max(2);
        Self {
            min_cluster_size,
            min_samples: min_samples.unwrap_or(min_cluster_size).max(1),
        }
    }
}

/// Flat clustering result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clustering {
    /// Cluster index per point, `None` for noise
    pub labels: Vec<Option<usize>>,

    /// Membership strength in `[0, 1]`, 0 for noise
    pub probabilities: Vec<f64>,
}

impl Clustering {
    /// Number of distinct clusters
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.labels.iter().flatten().collect::<BTreeSet<_>>().len()
    }

    fn all_noise(n: usize) -> Self {
        Self {
            labels: vec![None; n],
            probabilities: vec![0.0; n],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

fn lambda_of(distance: f64) -> f64 {
    1.0 / distance.max(1e-12)
}

/// Distance to the `k`-th nearest point, counting the point itself first
fn core_distances(points: &[Vec<f64>], k: usize) -> Vec<f64> {
    let k = k.min(points.len()).max(1);
    points
        .iter()
        .map(|p| {
            let mut dists: Vec<f64> = points.iter().map(|q| euclidean(p, q)).collect();
            dists.sort_by(f64::total_cmp);
            dists[k - 1]
        })
        .collect()
}

/// Prim's algorithm on the dense mutual reachability graph
fn mutual_reachability_mst(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = euclidean(&points[current], &points[j])
                .max(core[current])
                .max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
        }

        let mut next = None;
        for j in 0..n {
            if !in_tree[j] && next.map_or(true, |m: usize| best[j] < best[m]) {
                next = Some(j);
            }
        }
        let Some(next) = next else { break };

        in_tree[next] = true;
        edges.push((from[next], next, best[next]));
        current = next;
    }

    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    edges
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }
}

/// Single-linkage merges `(left, right, distance, size)`; merge `i` creates node `n + i`
fn single_linkage(n: usize, mst: &[(usize, usize, f64)]) -> Vec<(usize, usize, f64, usize)> {
    let mut uf = UnionFind::new(2 * n);
    let mut size = vec![1usize; 2 * n];
    let mut merges = Vec::with_capacity(mst.len());

    for (i, &(a, b, distance)) in mst.iter().enumerate() {
        let (ra, rb) = (uf.find(a), uf.find(b));
        let node = n + i;
        size[node] = size[ra] + size[rb];
        uf.parent[ra] = node;
        uf.parent[rb] = node;
        merges.push((ra, rb, distance, size[node]));
    }

    merges
}

fn leaves_under(node: usize, n: usize, merges: &[(usize, usize, f64, usize)], out: &mut Vec<usize>) {
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        if x < n {
            out.push(x);
        } else {
            let (l, r, _, _) = merges[x - n];
            stack.push(l);
            stack.push(r);
        }
    }
}

/// Condense the hierarchy, dropping splits smaller than `min_cluster_size`
///
/// Cluster labels start at `n` (the root); points keep their indices.
fn condense_tree(n: usize, merges: &[(usize, usize, f64, usize)], min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = n + merges.len() - 1;
    let node_size = |x: usize| if x < n { 1 } else { merges[x - n].3 };

    let mut edges = Vec::new();
    let mut next_label = n + 1;
    let mut stack = vec![(root, n)];

    while let Some((node, label)) = stack.pop() {
        if node < n {
            continue;
        }
        let (left, right, distance, _) = merges[node - n];
        let lambda = lambda_of(distance);
        let (left_size, right_size) = (node_size(left), node_size(right));

        let left_big = left_size >= min_cluster_size;
        let right_big = right_size >= min_cluster_size;

        if left_big && right_big {
            for (child, child_size) in [(left, left_size), (right, right_size)] {
                edges.push(CondensedEdge {
                    parent: label,
                    child: next_label,
                    lambda,
                    size: child_size,
                });
                stack.push((child, next_label));
                next_label += 1;
            }
        } else {
            for (child, big) in [(left, left_big), (right, right_big)] {
                if big {
                    stack.push((child, label));
                } else {
                    let mut points = Vec::new();
                    leaves_under(child, n, merges, &mut points);
                    edges.extend(points.into_iter().map(|p| CondensedEdge {
                        parent: label,
                        child: p,
                        lambda,
                        size: 1,
                    }));
                }
            }
        }
    }

    edges
}

/// Excess-of-mass selection over the condensed tree, root excluded
fn select_clusters(n: usize, tree: &[CondensedEdge]) -> BTreeSet<usize> {
    let mut birth: BTreeMap<usize, f64> = BTreeMap::new();
    birth.insert(n, 0.0);
    for edge in tree.iter().filter(|e| e.child >= n) {
        birth.insert(edge.child, edge.lambda);
    }

    let mut stability: BTreeMap<usize, f64> = birth.keys().map(|&c| (c, 0.0)).collect();
    for edge in tree {
        let born = birth.get(&edge.parent).copied().unwrap_or(0.0);
        if let Some(s) = stability.get_mut(&edge.parent) {
            *s += (edge.lambda - born) * edge.size as f64;
        }
    }

    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for edge in tree.iter().filter(|e| e.child >= n) {
        children.entry(edge.parent).or_default().push(edge.child);
    }

    let mut selected: BTreeSet<usize> = BTreeSet::new();
    // Children carry larger labels than their parents
    let order: Vec<usize> = stability.keys().rev().copied().filter(|&c| c != n).collect();
    for cluster in order {
        let own = stability[&cluster];
        let kids = children.get(&cluster).cloned().unwrap_or_default();
        let subtree: f64 = kids.iter().map(|k| stability[k]).sum();

        if kids.is_empty() || own >= subtree {
            let mut stack = kids;
            while let Some(k) = stack.pop() {
                selected.remove(&k);
                if let Some(grand) = children.get(&k) {
                    stack.extend(grand.iter().copied());
                }
            }
            selected.insert(cluster);
        } else if let Some(s) = stability.get_mut(&cluster) {
            *s = subtree;
        }
    }

    selected
}

/// Run HDBSCAN over points in Euclidean space
#[must_use]
pub fn hdbscan(points: &[Vec<f64>], params: HdbscanParams) -> Clustering {
    let n = points.len();
    if n < 2 || n < params.min_cluster_size {
        return Clustering::all_noise(n);
    }

    let core = core_distances(points, params.min_samples);
    let mst = mutual_reachability_mst(points, &core);
    let merges = single_linkage(n, &mst);
    let tree = condense_tree(n, &merges, params.min_cluster_size);
    let selected = select_clusters(n, &tree);

    let mut cluster_parent: BTreeMap<usize, usize> = BTreeMap::new();
    let mut point_edge: Vec<Option<CondensedEdge>> = vec![None; n];
    for edge in &tree {
        if edge.child >= n {
            cluster_parent.insert(edge.child, edge.parent);
        } else {
            point_edge[edge.child] = Some(*edge);
        }
    }

    let mut raw_labels: Vec<Option<usize>> = vec![None; n];
    for (p, edge) in point_edge.iter().enumerate() {
        let Some(edge) = edge else { continue };
        let mut cluster = edge.parent;
        loop {
            if selected.contains(&cluster) {
                raw_labels[p] = Some(cluster);
                break;
            }
            match cluster_parent.get(&cluster) {
                Some(&up) => cluster = up,
                None => break,
            }
        }
    }

    let mut max_lambda: BTreeMap<usize, f64> = BTreeMap::new();
    for (p, label) in raw_labels.iter().enumerate() {
        if let (Some(c), Some(edge)) = (label, point_edge[p]) {
            let entry = max_lambda.entry(*c).or_insert(0.0);
            *entry = entry.max(edge.lambda);
        }
    }

    // Dense ids in order of first appearance
    let mut dense: BTreeMap<usize, usize> = BTreeMap::new();
    let mut labels = Vec::with_capacity(n);
    let mut probabilities = Vec::with_capacity(n);
    for (p, label) in raw_labels.iter().enumerate() {
        match (label, point_edge[p]) {
            (Some(c), Some(edge)) => {
                let next = dense.len();
                labels.push(Some(*dense.entry(*c).or_insert(next)));
                let max = max_lambda.get(c).copied().unwrap_or(0.0);
                probabilities.push(if max > 0.0 { (edge.lambda / max).min(1.0) } else { 1.0 });
            }
            _ => {
                labels.push(None);
                probabilities.push(0.0);
            }
        }
    }

    let clustering = Clustering {
        labels,
        probabilities,
    };
    tracing::debug!(
        points = n,
        clusters = clustering.n_clusters(),
        noise = clustering.labels.iter().filter(|l| l.is_none()).count(),
        "Density clustering complete"
    );
    clustering
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn nested_tree(leaf_lambda: f64) -> Vec<CondensedEdge> {
        let edge = |parent, child, lambda, size| CondensedEdge { parent, child, lambda, size };
        let mut tree = vec![
            edge(10, 11, 1.0, 6),
            edge(10, 12, 1.0, 4),
            edge(11, 13, 2.0, 3),
            edge(11, 14, 2.0, 3),
        ];
        tree.extend((0..3).map(|p| edge(13, p, leaf_lambda, 1)));
        tree.extend((3..6).map(|p| edge(14, p, leaf_lambda, 1)));
        tree.extend((6..10).map(|p| edge(12, p, 1.5, 1)));
        tree
    }

    #[test]
    fn test_select_clusters_prefers_stable_children() {
        // Children hold 24 each against 6 for their parent
        let selected = select_clusters(10, &nested_tree(10.0));
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![12, 13, 14]);
    }

    #[test]
    fn test_select_clusters_keeps_parent_over_weak_children() {
        // Children hold 1.5 each against 6 for their parent
        let selected = select_clusters(10, &nested_tree(2.5));
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![11, 12]);
    }

    fn blob(center: [f64; 2], count: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
        (0..count)
            .map(|_| vec![center[0] + rng.gen_range(-0.5..0.5), center[1] + rng.gen_range(-0.5..0.5)])
            .collect()
    }

    #[test]
    fn test_two_blobs_and_noise() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut points = blob([0.0, 0.0], 30, &mut rng);
        points.extend(blob([20.0, 20.0], 30, &mut rng));
        points.push(vec![-40.0, 60.0]);

        let result = hdbscan(&points, HdbscanParams::new(10, None));
        assert_eq!(result.n_clusters(), 2);

        let first = result.labels[0];
        assert!(first.is_some());
        assert!(result.labels[..30].iter().all(|l| *l == first));
        assert!(result.labels[30..60].iter().all(|l| l.is_some() && *l != first));
        assert_eq!(result.labels[60], None);
        assert_eq!(result.probabilities[60], 0.0);
        assert!(result
            .probabilities
            .iter()
            .all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_single_blob_is_not_a_cluster_by_itself() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let points = blob([0.0, 0.0], 15, &mut rng);
        let result = hdbscan(&points, HdbscanParams::new(10, None));
        // A split into two groups of ten is impossible, and the root is never selected
        assert_eq!(result.n_clusters(), 0);
    }

    #[test]
    fn test_too_few_points() {
        let result = hdbscan(&[vec![0.0], vec![1.0]], HdbscanParams::new(5, None));
        assert_eq!(result.labels, vec![None, None]);
        assert!(hdbscan(&[], HdbscanParams::new(5, None)).labels.is_empty());
    }

    #[test]
    fn test_min_samples_defaults_to_cluster_size() {
        let params = HdbscanParams::new(50, None);
        assert_eq!(params.min_samples, 50);
        assert_eq!(HdbscanParams::new(50, Some(5)).min_samples, 5);
    }
}
