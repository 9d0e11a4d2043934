//! Gradient boosted trees for binary classification
//!
//! Log-loss boosting: each stage fits a shallow regression tree to the
//! residuals `y - p` on a row subsample, then replaces every leaf value
//! with a single Newton step computed from the in-bag rows of that leaf.

use super::decision_tree::DecisionTree;
use super::linear_models::sigmoid;
use crate::error::{ErrorKind, PhishGuardError, Result};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gradient boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn, without replacement, for each stage
    pub subsample: f64,
    /// Random seed
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: 0,
        }
    }
}

/// Gradient boosting classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_prediction: f64,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_prediction: 0.0,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }

    fn subsample_indices(&self, n_samples: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.config.subsample >= 1.0 {
            return indices;
        }
        let n_draw = ((self.config.subsample * n_samples as f64) as usize).clamp(1, n_samples);
        indices.shuffle(rng);
        indices.truncate(n_draw);
        indices.sort_unstable();
        indices
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PhishGuardError::shape(
                format!("{n_samples} targets"),
                format!("{} targets", y.len()),
            ));
        }
        if n_samples == 0 {
            return Err(PhishGuardError::training("cannot boost on zero samples"));
        }
        if !(self.config.subsample > 0.0 && self.config.subsample <= 1.0) {
            return Err(PhishGuardError::config(format!(
                "subsample must be in (0, 1], got {}",
                self.config.subsample
            )));
        }

        // Prior log-odds, clipped so a single-class set stays finite
        let pos_rate = (y.sum() / n_samples as f64).clamp(1e-6, 1.0 - 1e-6);
        self.initial_prediction = (pos_rate / (1.0 - pos_rate)).ln();
        self.trees.clear();

        let mut raw = Array1::from_elem(n_samples, self.initial_prediction);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let unit_weights = vec![1.0; n_samples];

        for stage in 0..self.config.n_estimators {
            let prob = raw.mapv(sigmoid);
            let residuals = y - &prob;

            let in_bag = self.subsample_indices(n_samples, &mut rng);
            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(Some(self.config.max_depth))
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_random_state(self.config.random_state.wrapping_add(stage as u64));
            tree.fit_subset(x, &residuals, &in_bag, &unit_weights)?;

            let mut leaf_sums: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
            for &i in &in_bag {
                let entry = leaf_sums.entry(tree.apply_row(x.row(i))).or_insert((0.0, 0.0));
                entry.0 += residuals[i];
                entry.1 += prob[i] * (1.0 - prob[i]);
            }
            for (leaf, (numerator, denominator)) in leaf_sums {
                let value = if denominator.abs() < 1e-150 { 0.0 } else { numerator / denominator };
                tree.set_leaf_value(leaf, value)?;
            }

            raw.scaled_add(self.config.learning_rate, &tree.predict_value(x)?);
            self.trees.push(tree);
        }

        Ok(())
    }

    /// Raw log-odds
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.config.n_estimators > 0 {
            return Err(PhishGuardError::new(ErrorKind::ModelNotFitted));
        }
        let mut raw = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.trees {
            raw.scaled_add(self.config.learning_rate, &tree.predict_value(x)?);
        }
        Ok(raw)
    }

    /// P(y = 1)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }
}
