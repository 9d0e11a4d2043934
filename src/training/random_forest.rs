//! Random forest classifier

use super::decision_tree::{Criterion, DecisionTree, MaxFeatures};
use crate::error::{ErrorKind, PhishGuardError, Result};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-class sample weighting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every sample counts once
    Uniform,
    /// `n_samples / (n_classes * class_count)`
    Balanced,
}

/// Random forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split
    pub max_features: MaxFeatures,
    /// Impurity criterion
    pub criterion: Criterion,
    pub class_weight: ClassWeight,
    /// Base seed; tree `i` uses `random_state + i`
    pub random_state: u64,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            criterion: Criterion::Gini,
            class_weight: ClassWeight::Uniform,
            random_state: 0,
        }
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn class_weights(&self, y: &Array1<f64>) -> [f64; 2] {
        match self.class_weight {
            ClassWeight::Uniform => [1.0, 1.0],
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let n_pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
                let n_neg = n - n_pos;
                let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
                [weight(n_neg), weight(n_pos)]
            }
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PhishGuardError::shape(
                format!("{n_samples} targets"),
                format!("{} targets", y.len()),
            ));
        }
        if n_samples == 0 || self.n_estimators == 0 {
            return Err(PhishGuardError::training(
                "random forest needs samples and at least one tree",
            ));
        }

        let class_weights = self.class_weights(y);
        let indices: Vec<usize> = (0..n_samples).collect();

        let trees: Result<Vec<DecisionTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = self.random_state.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                // Bootstrap draw as per-row multiplicities
                let mut counts = vec![0.0f64; n_samples];
                for _ in 0..n_samples {
                    counts[rng.gen_range(0..n_samples)] += 1.0;
                }
                let weights: Vec<f64> = counts
                    .iter()
                    .zip(y.iter())
                    .map(|(&c, &label)| c * class_weights[usize::from(label > 0.5)])
                    .collect();
                let in_bag: Vec<usize> = indices.iter().copied().filter(|&i| counts[i] > 0.0).collect();

                let mut tree = DecisionTree::new_classifier()
                    .with_max_depth(self.max_depth)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_max_features(self.max_features)
                    .with_random_state(seed);
                tree.fit_subset(x, y, &in_bag, &weights)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        Ok(self)
    }

    /// Mean of per-tree P(y = 1)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PhishGuardError::new(ErrorKind::ModelNotFitted));
        }
        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict_value(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 4), |(i, j)| {
            let base = if i < 30 { 0.0 } else { 5.0 };
            base + ((i * 7 + j * 3) % 10) as f64 / 10.0
        });
        let y = Array1::from_shape_fn(60, |i| if i < 30 { 0.0 } else { 1.0 });
        (x, y)
    }

    #[test]
    fn test_forest_fits_blobs() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(10).with_random_state(7);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 10);

        let p = rf.predict_proba(&x).unwrap();
        let correct = p.iter().zip(y.iter()).filter(|(&pi, &yi)| (pi > 0.5) == (yi > 0.5)).count();
        assert_eq!(correct, 60);
    }

    #[test]
    fn test_forest_is_seeded() {
        let (x, y) = blobs();
        let run = || {
            let mut rf = RandomForest::new(5)
                .with_random_state(11)
                .with_class_weight(ClassWeight::Balanced);
            rf.fit(&x, &y).unwrap();
            rf.predict_proba(&x).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_balanced_weights() {
        let rf = RandomForest::new(1).with_class_weight(ClassWeight::Balanced);
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        let [w0, w1] = rf.class_weights(&y);
        assert!((w0 - 4.0 / 6.0).abs() < 1e-12);
        assert!((w1 - 2.0).abs() < 1e-12);
    }
}
