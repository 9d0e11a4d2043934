//! CART decision tree
//!
//! Classification trees store the weighted fraction of class 1 in each
//! leaf; regression trees store the weighted mean target. Nodes live in a
//! flat arena so boosting can address and rewrite individual leaves.

use crate::error::{PhishGuardError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    Mse,
}

impl Criterion {
    pub fn is_classification(self) -> bool {
        !matches!(self, Criterion::Mse)
    }
}

/// Features considered at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// floor(sqrt(n_features))
    Sqrt,
    /// floor(log2(n_features))
    Log2,
    /// All features
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::All => n_features,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Weighted running statistics for one side of a split
#[derive(Debug, Clone, Copy, Default)]
struct SideStats {
    count: usize,
    weight: f64,
    /// Weight of class 1, or sum of w*y for regression
    weighted_y: f64,
    /// Sum of w*y^2 (regression only)
    weighted_y2: f64,
}

impl SideStats {
    fn add(&mut self, w: f64, y: f64) {
        self.count += 1;
        self.weight += w;
        self.weighted_y += w * y;
        self.weighted_y2 += w * y * y;
    }

    fn sub(&mut self, w: f64, y: f64) {
        self.count -= 1;
        self.weight -= w;
        self.weighted_y -= w * y;
        self.weighted_y2 -= w * y * y;
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        match criterion {
            Criterion::Gini => {
                let p1 = (self.weighted_y / self.weight).clamp(0.0, 1.0);
                let p0 = 1.0 - p1;
                1.0 - p0 * p0 - p1 * p1
            }
            Criterion::Entropy => {
                let p1 = (self.weighted_y / self.weight).clamp(0.0, 1.0);
                [p1, 1.0 - p1]
                    .iter()
                    .filter(|&&p| p > 0.0)
                    .map(|&p| -p * p.log2())
                    .sum()
            }
            Criterion::Mse => {
                let mean = self.weighted_y / self.weight;
                (self.weighted_y2 / self.weight - mean * mean).max(0.0)
            }
        }
    }

    fn value(&self) -> f64 {
        if self.weight <= 0.0 {
            0.0
        } else {
            self.weighted_y / self.weight
        }
    }
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    improvement: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split
    pub max_features: MaxFeatures,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for the per-split feature draw
    pub random_state: u64,
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
            random_state: 0,
            n_features: 0,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::Mse,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, TreeNode::Leaf { .. })).count()
    }

    /// Fit with unit sample weights
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let weights = vec![1.0; x.nrows()];
        self.fit_subset(x, y, &indices, &weights)
    }

    /// Fit on the rows in `indices`, with per-row weights indexed like `x`
    pub fn fit_subset(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        sample_weight: &[f64],
    ) -> Result<&mut Self> {
        if x.nrows() != y.len() || sample_weight.len() != y.len() {
            return Err(PhishGuardError::shape(
                format!("{} targets and weights", x.nrows()),
                format!("{} targets, {} weights", y.len(), sample_weight.len()),
            ));
        }
        if indices.is_empty() {
            return Err(PhishGuardError::training("cannot fit a tree on zero samples"));
        }
        if self.criterion.is_classification() && indices.iter().any(|&i| y[i] != 0.0 && y[i] != 1.0) {
            return Err(PhishGuardError::training("classification tree expects labels in {0, 1}"));
        }

        self.n_features = x.ncols();
        self.nodes.clear();

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut work: Vec<usize> = indices.to_vec();
        self.build(x, y, sample_weight, &mut work, 0, &mut rng);
        Ok(self)
    }

    fn stats_of(y: &Array1<f64>, weights: &[f64], indices: &[usize]) -> SideStats {
        let mut stats = SideStats::default();
        for &i in indices {
            stats.add(weights[i], y[i]);
        }
        stats
    }

    fn build(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: &[f64],
        indices: &mut [usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let node_stats = Self::stats_of(y, weights, indices);
        let n_samples = indices.len();
        let impurity = node_stats.impurity(self.criterion);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || impurity <= 1e-12;

        let split = if should_stop {
            None
        } else {
            self.find_best_split(x, y, weights, indices, &node_stats, rng)
        };

        let Some(split) = split else {
            self.nodes.push(TreeNode::Leaf {
                value: node_stats.value(),
                n_samples,
            });
            return self.nodes.len() - 1;
        };

        // Reserve this node's slot before the children
        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: node_stats.value(),
            n_samples,
        });

        let (feature_idx, threshold) = (split.feature_idx, split.threshold);
        let mid = partition_in_place(indices, |i| x[[i, feature_idx]] <= threshold);
        let (left_rows, right_rows) = indices.split_at_mut(mid);
        let left = self.build(x, y, weights, left_rows, depth + 1, rng);
        let right = self.build(x, y, weights, right_rows, depth + 1, rng);

        self.nodes[node_idx] = TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        };
        node_idx
    }

    /// Best split over a random feature draw
    ///
    /// Features are visited in shuffled order. The search stops once
    /// `max_features` non-constant features have been examined, so constant
    /// features never use up the budget.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: &[f64],
        indices: &[usize],
        node_stats: &SideStats,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let budget = self.max_features.resolve(self.n_features);
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if budget < self.n_features {
            features.shuffle(rng);
        }

        let parent_impurity = node_stats.impurity(self.criterion);
        let mut best: Option<BestSplit> = None;
        let mut visited = 0usize;
        let mut order: Vec<usize> = indices.to_vec();

        for feature_idx in features {
            if visited >= budget {
                break;
            }

            order.sort_by(|&a, &b| {
                x[[a, feature_idx]]
                    .partial_cmp(&x[[b, feature_idx]])
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            });

            let first = x[[order[0], feature_idx]];
            let last = x[[order[order.len() - 1], feature_idx]];
            if first == last {
                continue;
            }
            visited += 1;

            let mut left = SideStats::default();
            let mut right = *node_stats;

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left.add(weights[i], y[i]);
                right.sub(weights[i], y[i]);

                let here = x[[i, feature_idx]];
                let next = x[[order[pos + 1], feature_idx]];
                if here == next {
                    continue;
                }
                if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                    continue;
                }
                if left.weight <= 0.0 || right.weight <= 0.0 {
                    continue;
                }

                let total = left.weight + right.weight;
                let child = (left.weight * left.impurity(self.criterion)
                    + right.weight * right.impurity(self.criterion))
                    / total;
                let improvement = parent_impurity - child;

                if best.as_ref().map_or(true, |b| improvement > b.improvement) {
                    let mut threshold = (here + next) / 2.0;
                    // Guard against the midpoint rounding up to `next`
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature_idx,
                        threshold,
                        improvement,
                    });
                }
            }
        }

        best
    }

    /// Index of the leaf reached by `row`
    pub fn apply_row(&self, row: ArrayView1<f64>) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { .. } => return idx,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    idx = if row[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Overwrite a leaf's prediction (boosting line search)
    pub fn set_leaf_value(&mut self, leaf: usize, new_value: f64) -> Result<()> {
        match self.nodes.get_mut(leaf) {
            Some(TreeNode::Leaf { value, .. }) => {
                *value = new_value;
                Ok(())
            }
            _ => Err(PhishGuardError::training(format!("node {leaf} is not a leaf"))),
        }
    }

    /// Leaf value per row: P(class 1) for classifiers, mean target for regressors
    pub fn predict_value(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(PhishGuardError::new(crate::error::ErrorKind::ModelNotFitted));
        }
        if x.ncols() != self.n_features {
            return Err(PhishGuardError::shape(
                format!("{} features", self.n_features),
                format!("{} features", x.ncols()),
            ));
        }
        Ok(x
            .rows()
            .into_iter()
            .map(|row| match &self.nodes[self.apply_row(row)] {
                TreeNode::Leaf { value, .. } => *value,
                TreeNode::Split { .. } => f64::NAN,
            })
            .collect())
    }
}

/// Stable-enough partition: rows satisfying `pred` first, returns the split point
fn partition_in_place<F: Fn(usize) -> bool>(indices: &mut [usize], pred: F) -> usize {
    let mut left: Vec<usize> = Vec::with_capacity(indices.len());
    let mut right: Vec<usize> = Vec::with_capacity(indices.len());
    for &i in indices.iter() {
        if pred(i) {
            left.push(i);
        } else {
            right.push(i);
        }
    }
    let mid = left.len();
    for (slot, i) in indices.iter_mut().zip(left.into_iter().chain(right)) {
        *slot = i;
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tree_separates_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let p = tree.predict_value(&x).unwrap();
        assert_eq!(p.to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 1.0, 0.0];
        let mut stump = DecisionTree::new_classifier().with_max_depth(Some(1));
        stump.fit(&x, &y).unwrap();
        assert!(stump.n_leaves() <= 2);

        let mut full = DecisionTree::new_classifier().with_criterion(Criterion::Entropy);
        full.fit(&x, &y).unwrap();
        assert_eq!(full.predict_value(&x).unwrap().to_vec(), y.to_vec());
    }

    #[test]
    fn test_min_samples_leaf_gives_fractional_leaves() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut tree = DecisionTree::new_classifier().with_min_samples_leaf(2);
        tree.fit(&x, &y).unwrap();
        let p = tree.predict_value(&x).unwrap();
        assert!(p.iter().all(|&v| (v - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_sample_weights_shift_leaf_value() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit_subset(&x, &y, &[0, 1, 2], &[2.0, 1.0, 1.0]).unwrap();
        let p = tree.predict_value(&x).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_regressor_and_leaf_rewrite() {
        let x = array![[1.0], [2.0], [8.0], [9.0]];
        let y = array![1.0, 1.0, 5.0, 5.0];
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict_value(&x).unwrap().to_vec(), vec![1.0, 1.0, 5.0, 5.0]);

        let leaf = tree.apply_row(x.row(0));
        tree.set_leaf_value(leaf, -3.0).unwrap();
        assert_eq!(tree.predict_value(&x).unwrap()[0], -3.0);
        assert!(tree.set_leaf_value(0, 1.0).is_err(), "root is a split");
    }

    #[test]
    fn test_seeded_feature_draw_is_reproducible() {
        let x = Array2::from_shape_fn((40, 6), |(i, j)| ((i * (j + 3)) % 7) as f64);
        let y = Array1::from_shape_fn(40, |i| ((i * 5) % 3 == 0) as i32 as f64);

        let fit = |seed| {
            let mut t = DecisionTree::new_classifier()
                .with_max_features(MaxFeatures::Sqrt)
                .with_random_state(seed);
            t.fit(&x, &y).unwrap();
            t.predict_value(&x).unwrap()
        };
        assert_eq!(fit(3), fit(3));
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 2.0];
        assert!(DecisionTree::new_classifier().fit(&x, &y).is_err());
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(30), 5);
        assert_eq!(MaxFeatures::Log2.resolve(30), 4);
        assert_eq!(MaxFeatures::All.resolve(30), 30);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
    }
}
