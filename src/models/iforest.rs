// src/models/iforest.rs

use ndarray::{ArrayView1, ArrayView2};
use rand::prelude::*;
use rand::seq::index;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.5772156649;

// Isolation tree node. Leaves remember how many training samples reached them
// so scoring can add the expected depth of the unbuilt subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Ensemble of isolation trees grown on random subsamples of the training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    n_features: usize,
}

impl IsolationForest {
    /// Grow `n_estimators` trees, each on `min(max_samples, rows)` rows drawn
    /// without replacement. The result depends only on `x` and `seed`.
    pub fn fit(x: ArrayView2<'_, f64>, n_estimators: usize, max_samples: usize, seed: u64) -> Self {
        let n_rows = x.nrows();
        let sample_size = max_samples.min(n_rows).max(1);
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        // Per-tree seeds are drawn up front so trees can be grown in parallel
        // without changing the outcome.
        let mut rng = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..n_estimators).map(|_| rng.gen()).collect();

        let trees = tree_seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                if n_rows == 0 {
                    return Node::Leaf { size: 0 };
                }
                let sample = index::sample(&mut rng, n_rows, sample_size).into_vec();
                Self::build_tree(x, &sample, 0, height_limit, &mut rng)
            })
            .collect();

        IsolationForest {
            trees,
            sample_size,
            n_features: x.ncols(),
        }
    }

    fn build_tree(
        x: ArrayView2<'_, f64>,
        rows: &[usize],
        height: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> Node {
        let size = rows.len();

        // Stop criteria
        if size <= 1 || height >= height_limit {
            return Node::Leaf { size };
        }

        // Only features that still vary inside this node can isolate anything.
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|f| {
                let (min_val, max_val) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = x[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (max_val - min_val > 1e-10).then_some((f, min_val, max_val))
            })
            .collect();

        let Some(&(feature, min_val, max_val)) = candidates.choose(rng) else {
            return Node::Leaf { size };
        };

        let value = rng.gen::<f64>() * (max_val - min_val) + min_val;
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| x[[r, feature]] < value);

        // Only split if we actually divided the data
        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size };
        }

        Node::Split {
            feature,
            value,
            left: Box::new(Self::build_tree(x, &left, height + 1, height_limit, rng)),
            right: Box::new(Self::build_tree(x, &right, height + 1, height_limit, rng)),
        }
    }

    fn path_length(node: &Node, x: ArrayView1<'_, f64>, depth: usize) -> f64 {
        match node {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split { feature, value, left, right } => {
                if x[*feature] < *value {
                    Self::path_length(left, x, depth + 1)
                } else {
                    Self::path_length(right, x, depth + 1)
                }
            }
        }
    }

    /// Anomaly score per row in `(0, 1]`; values near 1 are easy to isolate.
    pub fn score_samples(&self, x: ArrayView2<'_, f64>) -> Vec<f64> {
        let norm = average_path_length(self.sample_size);
        let n_trees = self.trees.len().max(1) as f64;
        (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                let total: f64 = self.trees.iter().map(|t| Self::path_length(t, row, 0)).sum();
                let avg = total / n_trees;
                if norm > 0.0 {
                    2.0f64.powf(-avg / norm)
                } else {
                    1.0
                }
            })
            .collect()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

/// Expected path length of an unsuccessful search in a binary search tree of
/// `n` nodes, used to normalise isolation depths.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
