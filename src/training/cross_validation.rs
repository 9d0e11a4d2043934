//! Stratified k-fold splitting
//!
//! Samples of each class keep their original order and fold `i` receives
//! the `i`-th block of every class, so fold class proportions match the
//! full set as closely as possible.

use crate::error::{PhishGuardError, Result};
use ndarray::Array1;
use std::collections::BTreeMap;

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate train/test splits; test indices are sorted ascending
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let k = self.n_splits;
        if k < 2 {
            return Err(PhishGuardError::invalid_input("n_splits must be at least 2"));
        }

        // Group samples by class, classes ordered by label
        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            by_class.entry(val.round() as i64).or_default().push(idx);
        }

        let largest = by_class.values().map(Vec::len).max().unwrap_or(0);
        if largest < k {
            return Err(PhishGuardError::invalid_input(format!(
                "n_splits={k} cannot be greater than the number of members in each class (max {largest})"
            )));
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
        for indices in by_class.values() {
            let n = indices.len();
            let mut start = 0;
            for (fold, bucket) in folds.iter_mut().enumerate() {
                let size = n / k + usize::from(fold < n % k);
                bucket.extend_from_slice(&indices[start..start + size]);
                start += size;
            }
        }

        let n_samples = y.len();
        let splits = folds
            .into_iter()
            .enumerate()
            .map(|(fold_idx, mut test_indices)| {
                test_indices.sort_unstable();
                let mut in_test = vec![false; n_samples];
                for &i in &test_indices {
                    in_test[i] = true;
                }
                let train_indices = (0..n_samples).filter(|&i| !in_test[i]).collect();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}
