//! Neighbourhood-graph dimensionality reduction (UMAP-style)
//!
//! A cosine k-nearest-neighbour graph is turned into a fuzzy set of weighted
//! edges, then a low-dimensional layout is optimised by stochastic gradient
//! descent with negative sampling. All randomness comes from a seeded
//! ChaCha generator, so identical input order gives identical output.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::config::TopicConfig;
use crate::embedding::cosine_distance;
use crate::utils::optimize::nelder_mead;

const NEGATIVE_SAMPLE_RATE: usize = 5;
const SMOOTH_KNN_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const INIT_RANGE: f64 = 10.0;
const GRAD_CLIP: f64 = 4.0;

/// Nearest neighbours of every point, excluding the point itself
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    /// Neighbour indices, nearest first
    pub indices: Vec<Vec<usize>>,

    /// Matching cosine distances
    pub distances: Vec<Vec<f64>>,
}

impl Neighbors {
    /// Distance to the farthest retained neighbour of each point
    #[must_use]
    pub fn kth_distances(&self) -> Vec<f64> {
        self.distances
            .iter()
            .map(|d| d.last().copied().unwrap_or(0.0))
            .collect()
    }
}

/// Brute-force cosine k-nearest neighbours
///
/// Ties are broken by the lower index. At most `n - 1` neighbours are kept.
#[must_use]
pub fn cosine_knn(data: &[Vec<f32>], k: usize) -> Neighbors {
    let n = data.len();
    let k = k.min(n.saturating_sub(1));
    let mut neighbors = Neighbors {
        indices: Vec::with_capacity(n),
        distances: Vec::with_capacity(n),
    };

    for (i, point) in data.iter().enumerate() {
        let mut row: Vec<(f64, usize)> = data
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, other)| (f64::from(cosine_distance(point, other)), j))
            .collect();
        row.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        row.truncate(k);

        neighbors.distances.push(row.iter().map(|(d, _)| *d).collect());
        neighbors.indices.push(row.into_iter().map(|(_, j)| j).collect());
    }

    neighbors
}

/// Layout parameters
#[derive(Debug, Clone)]
pub struct UmapParams {
    pub n_components: usize,
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub n_epochs: usize,
    pub seed: u64,
}

impl From<&TopicConfig> for UmapParams {
    fn from(config: &TopicConfig) -> Self {
        Self {
            n_components: config.n_components,
            n_neighbors: config.n_neighbors,
            min_dist: config.min_dist,
            spread: 1.0,
            n_epochs: config.n_epochs,
            seed: config.seed,
        }
    }
}

impl Default for UmapParams {
    fn default() -> Self {
        Self::from(&TopicConfig::default())
    }
}

/// Fit `1 / (1 + a x^(2b))` to the target membership curve
#[must_use]
pub fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300).map(|i| spread * 3.0 * i as f64 / 299.0).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let loss = |p: &[f64; 2]| {
        let (a, b) = (p[0].exp(), p[1].exp());
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| (1.0 / (1.0 + a * x.powf(2.0 * b)) - y).powi(2))
            .sum::<f64>()
    };

    let (best, _) = nelder_mead(loss, [1.896f64.ln(), 0.8006f64.ln()], 1000);
    (best[0].exp(), best[1].exp())
}

/// Per-point `(rho, sigma)` so that memberships sum to `log2(k + 1)`
fn smooth_knn_dist(neighbors: &Neighbors) -> Vec<(f64, f64)> {
    let all_mean = {
        let (sum, count) = neighbors
            .distances
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(s, c), d| (s + d, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    };

    neighbors
        .distances
        .iter()
        .map(|dists| {
            let target = ((dists.len() + 1) as f64).log2();
            let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

            let mut lo = 0.0;
            let mut hi = f64::INFINITY;
            let mut mid = 1.0;

            for _ in 0..64 {
                let psum: f64 = dists
                    .iter()
                    .map(|&d| {
                        let gap = d - rho;
                        if gap > 0.0 {
                            (-gap / mid).exp()
                        } else {
                            1.0
                        }
                    })
                    .sum();

                if (psum - target).abs() < SMOOTH_KNN_TOLERANCE {
                    break;
                }

                if psum > target {
                    hi = mid;
                    mid = (lo + hi) / 2.0;
                } else {
                    lo = mid;
                    mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
                }
            }

            let local_mean = if dists.is_empty() {
                0.0
            } else {
                dists.iter().sum::<f64>() / dists.len() as f64
            };
            let floor = if rho > 0.0 { local_mean } else { all_mean } * MIN_K_DIST_SCALE;

            (rho, mid.max(floor))
        })
        .collect()
}

/// Symmetric fuzzy edge set as directed `(head, tail, weight)` triples
///
/// Directed memberships are combined by fuzzy union `a + b - ab`; each
/// undirected edge is emitted in both directions.
#[must_use]
pub fn fuzzy_simplicial_set(neighbors: &Neighbors) -> Vec<(usize, usize, f64)> {
    let scales = smooth_knn_dist(neighbors);
    let mut pairs: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();

    for (i, (indices, dists)) in neighbors.indices.iter().zip(&neighbors.distances).enumerate() {
        let (rho, sigma) = scales[i];
        for (&j, &d) in indices.iter().zip(dists) {
            let gap = d - rho;
            let weight = if gap <= 0.0 || sigma == 0.0 {
                1.0
            } else {
                (-gap / sigma).exp()
            };
            let entry = pairs.entry((i.min(j), i.max(j))).or_insert((0.0, 0.0));
            if i < j {
                entry.0 = weight;
            } else {
                entry.1 = weight;
            }
        }
    }

    pairs
        .into_iter()
        .filter_map(|((i, j), (a, b))| {
            let w = a + b - a * b;
            (w > 0.0).then_some([(i, j, w), (j, i, w)])
        })
        .flatten()
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn clip(value: f64) -> f64 {
    value.clamp(-GRAD_CLIP, GRAD_CLIP)
}

/// Reduce cosine-space embeddings to `n_components` dimensions
#[must_use]
pub fn reduce(data: &[Vec<f32>], params: &UmapParams) -> Vec<Vec<f64>> {
    let n = data.len();
    let dim = params.n_components.max(1);
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![vec![0.0; dim]];
    }

    let neighbors = cosine_knn(data, params.n_neighbors.saturating_sub(1).max(1));
    let edges = fuzzy_simplicial_set(&neighbors);
    let (a, b) = find_ab_params(params.spread, params.min_dist);

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut layout: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE)).collect())
        .collect();

    let n_epochs = params.n_epochs.max(1);
    let max_weight = edges.iter().map(|e| e.2).fold(0.0, f64::max);
    let edges: Vec<(usize, usize, f64)> = edges
        .into_iter()
        .filter(|e| e.2 >= max_weight / n_epochs as f64)
        .collect();

    let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.2).collect();
    let epochs_per_negative: Vec<f64> = epochs_per_sample
        .iter()
        .map(|e| e / NEGATIVE_SAMPLE_RATE as f64)
        .collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    for epoch in 0..n_epochs {
        let learning_rate = 1.0 - epoch as f64 / n_epochs as f64;
        let now = epoch as f64;

        for (e, &(head, tail, _)) in edges.iter().enumerate() {
            if next_sample[e] > now {
                continue;
            }

            let dist_sq = squared_distance(&layout[head], &layout[tail]);
            let coeff = if dist_sq > 0.0 {
                -2.0 * a * b * dist_sq.powf(b - 1.0) / (1.0 + a * dist_sq.powf(b))
            } else {
                0.0
            };
            for d in 0..dim {
                let grad = clip(coeff * (layout[head][d] - layout[tail][d])) * learning_rate;
                layout[head][d] += grad;
                layout[tail][d] -= grad;
            }
            next_sample[e] += epochs_per_sample[e];

            let n_negative = ((now - next_negative[e]) / epochs_per_negative[e]).floor().max(0.0) as usize;
            for _ in 0..n_negative {
                let other = rng.gen_range(0..n);
                if other == head {
                    continue;
                }
                let dist_sq = squared_distance(&layout[head], &layout[other]);
                let coeff = if dist_sq > 0.0 {
                    2.0 * b / ((0.001 + dist_sq) * (1.0 + a * dist_sq.powf(b)))
                } else {
                    0.0
                };
                for d in 0..dim {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (layout[head][d] - layout[other][d]))
                    } else {
                        GRAD_CLIP
                    };
                    layout[head][d] += grad * learning_rate;
                }
            }
            next_negative[e] += n_negative as f64 * epochs_per_negative[e];
        }
    }

    tracing::debug!(
        points = n,
        edges = edges.len(),
        components = dim,
        epochs = n_epochs,
        "Reduced embeddings"
    );

    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: &[f32], count: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| center.iter().map(|c| c + rng.gen_range(-0.05..0.05)).collect())
            .collect()
    }

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_knn_excludes_self_and_sorts() {
        let data = vec![vec![1.0, 0.0], vec![1.0, 0.1], vec![0.0, 1.0], vec![1.0, 0.05]];
        let knn = cosine_knn(&data, 2);
        assert_eq!(knn.indices[0], vec![3, 1]);
        assert!(knn.distances[0][0] <= knn.distances[0][1]);
        assert!(knn.indices.iter().enumerate().all(|(i, row)| !row.contains(&i)));
    }

    #[test]
    fn test_knn_caps_at_n_minus_one() {
        let knn = cosine_knn(&[vec![1.0, 0.0], vec![0.0, 1.0]], 15);
        assert_eq!(knn.indices[0], vec![1]);
        assert!((knn.kth_distances()[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ab_params_for_zero_min_dist() {
        let (a, b) = find_ab_params(1.0, 0.0);
        assert!((a - 1.896).abs() < 0.05, "a = {a}");
        assert!((b - 0.8006).abs() < 0.05, "b = {b}");
    }

    #[test]
    fn test_fuzzy_set_is_symmetric() {
        let data = blob(&axis(8, 0), 12, 1);
        let edges = fuzzy_simplicial_set(&cosine_knn(&data, 4));
        let lookup: BTreeMap<(usize, usize), f64> =
            edges.iter().map(|&(i, j, w)| ((i, j), w)).collect();
        for (&(i, j), &w) in &lookup {
            assert_eq!(lookup.get(&(j, i)), Some(&w));
            assert!(w > 0.0 && w <= 1.0);
        }
    }

    #[test]
    fn test_reduce_is_reproducible() {
        let mut data = blob(&axis(8, 0), 20, 2);
        data.extend(blob(&axis(8, 1), 20, 3));
        let params = UmapParams {
            n_epochs: 50,
            ..UmapParams::default()
        };
        let first = reduce(&data, &params);
        let second = reduce(&data, &params);
        assert_eq!(first, second);
        assert_eq!(first.len(), 40);
        assert!(first.iter().all(|p| p.len() == 5 && p.iter().all(|x| x.is_finite())));
    }

    #[test]
    fn test_reduce_separates_blobs() {
        let mut data = blob(&axis(8, 0), 25, 4);
        data.extend(blob(&axis(8, 1), 25, 5));
        let layout = reduce(&data, &UmapParams::default());

        let centroid = |points: &[Vec<f64>]| -> Vec<f64> {
            let mut c = vec![0.0; points[0].len()];
            for p in points {
                for (ci, x) in c.iter_mut().zip(p) {
                    *ci += x / points.len() as f64;
                }
            }
            c
        };
        let (left, right) = layout.split_at(25);
        let (ca, cb) = (centroid(left), centroid(right));
        let between = squared_distance(&ca, &cb).sqrt();
        let spread = left
            .iter()
            .map(|p| squared_distance(p, &ca).sqrt())
            .chain(right.iter().map(|p| squared_distance(p, &cb).sqrt()))
            .fold(0.0, f64::max);
        assert!(between > spread, "between={between} spread={spread}");
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(reduce(&[], &UmapParams::default()).is_empty());
        assert_eq!(reduce(&[vec![1.0, 0.0]], &UmapParams::default()), vec![vec![0.0; 5]]);
    }
}
