//! Node centrality measures
//!
//! Betweenness and eigenvector centrality ignore edge weights; PageRank
//! follows them. Every measure returns one value per node in index order.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

use super::graph::{Graph, NodeId};
use super::GraphError;

/// Degree divided by `n - 1`; zero for graphs of at most one node
#[must_use]
pub fn degree_centrality<N: NodeId, A>(graph: &Graph<N, A>) -> Vec<f64> {
    let n = graph.node_count();
    if n <= 1 {
        return vec![0.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    (0..n).map(|i| graph.degree(i) as f64 * scale).collect()
}

/// Brandes betweenness, normalised by `(n - 1)(n - 2)`
///
/// With more than `sample_cap` nodes only `sample_cap` seeded source nodes
/// are used and the result is scaled by `n / sample_cap`, then clamped to 1.
#[must_use]
pub fn betweenness_centrality<N: NodeId, A>(graph: &Graph<N, A>, sample_cap: usize, seed: u64) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0; n];
    if n <= 2 {
        return centrality;
    }

    let sources: Vec<usize> = if sample_cap > 0 && n > sample_cap {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut picked = sample(&mut rng, n, sample_cap).into_vec();
        picked.sort_unstable();
        picked
    } else {
        (0..n).collect()
    };

    let mut stack = Vec::with_capacity(n);
    let mut queue = VecDeque::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];

    for &s in &sources {
        stack.clear();
        queue.clear();
        for i in 0..n {
            predecessors[i].clear();
            sigma[i] = 0.0;
            dist[i] = -1;
            delta[i] = 0.0;
        }
        sigma[s] = 1.0;
        dist[s] = 0;
        queue.push_back(s);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for (w, _) in graph.neighbors(v) {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    let mut scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    if sources.len() < n {
        scale *= n as f64 / sources.len() as f64;
    }
    for c in &mut centrality {
        *c = (*c * scale).clamp(0.0, 1.0);
    }
    centrality
}

/// Power iteration on `A + I`, unweighted, L2-normalised
///
/// Stops when the summed absolute change falls below `n * tolerance`.
pub fn eigenvector_centrality<N: NodeId, A>(
    graph: &Graph<N, A>,
    max_iter: usize,
    tolerance: f64,
) -> Result<Vec<f64>, GraphError> {
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut x = vec![1.0 / n as f64; n];
    for _ in 0..max_iter {
        let last = x.clone();
        for (v, &value) in last.iter().enumerate() {
            for (w, _) in graph.neighbors(v) {
                x[w] += value;
            }
        }

        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        for v in &mut x {
            *v /= norm;
        }

        let change: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if change < n as f64 * tolerance {
            return Ok(x);
        }
    }

    Err(GraphError::NonConvergence {
        algorithm: "eigenvector centrality",
        iterations: max_iter,
    })
}

/// Weighted PageRank; dangling mass is spread uniformly
///
/// Returns the last iterate together with whether it converged. The scores
/// always sum to 1 for a non-empty graph.
#[must_use]
pub fn pagerank<N: NodeId, A>(
    graph: &Graph<N, A>,
    damping: f64,
    max_iter: usize,
    tolerance: f64,
) -> (Vec<f64>, bool) {
    let n = graph.node_count();
    if n == 0 {
        return (Vec::new(), true);
    }

    let uniform = 1.0 / n as f64;
    let strength: Vec<f64> = (0..n).map(|i| graph.out_strength(i)).collect();
    let mut x = vec![uniform; n];

    for _ in 0..max_iter {
        let last = x.clone();
        x.iter_mut().for_each(|v| *v = 0.0);

        let mut dangling = 0.0;
        for v in 0..n {
            if strength[v] > 0.0 {
                for (w, weight) in graph.neighbors(v) {
                    x[w] += damping * last[v] * weight / strength[v];
                }
            } else {
                dangling += last[v];
            }
        }

        let base = damping * dangling * uniform + (1.0 - damping) * uniform;
        for v in &mut x {
            *v += base;
        }

        let change: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if change < n as f64 * tolerance {
            return (x, true);
        }
    }

    let total: f64 = x.iter().sum();
    if total > 0.0 {
        x.iter_mut().for_each(|v| *v /= total);
    }
    (x, false)
}
