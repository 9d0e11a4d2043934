//! Exhaustive grid search with stratified k-fold cross-validation
//!
//! Every (configuration, fold) pair is an independent job run on a bounded
//! pool. Results are collected in job order, so the winner does not depend
//! on scheduling.

use super::cross_validation::{CVSplit, StratifiedKFold};
use super::metrics::accuracy;
use super::models::{Classifier, ModelFamily};
use super::params::{describe, expand_grid, ParamGrid, ParamSet};
use crate::error::{PhishGuardError, Result};
use crate::utils::ordered_map;
use ndarray::{Array1, Array2, Axis};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cross-validated score of one configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResult {
    pub params: ParamSet,
    /// Per-fold accuracy, NaN where the fit failed
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Search outcome for one family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub family: ModelFamily,
    pub best_params: ParamSet,
    pub best_score: f64,
    pub cv_results: Vec<CVResult>,
}

/// Grid search over one family's hyperparameters
pub struct GridSearch<'p> {
    family: ModelFamily,
    grid: ParamGrid,
    cv: StratifiedKFold,
    random_state: u64,
    pool: &'p ThreadPool,
}

impl<'p> GridSearch<'p> {
    pub fn new(family: ModelFamily, grid: ParamGrid, pool: &'p ThreadPool) -> Self {
        Self {
            family,
            grid,
            cv: StratifiedKFold::new(5),
            random_state: 0,
            pool,
        }
    }

    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.cv = StratifiedKFold::new(n_folds);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn score_fold(&self, params: &ParamSet, split: &CVSplit, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut estimator = self.family.build(params, self.random_state)?;
        estimator.fit(&x_train, &y_train)?;
        Ok(accuracy(&y_test, &estimator.predict(&x_test)?))
    }

    /// Run the search; the first configuration with the best mean score wins
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult> {
        let configs = expand_grid(&self.grid);
        if configs.is_empty() {
            return Err(PhishGuardError::config(format!(
                "{}: hyperparameter grid has no combinations",
                self.family
            )));
        }
        // Surface bad parameter names before spending time on folds
        for params in &configs {
            self.family.build(params, self.random_state)?;
        }

        let splits = self.cv.split(y)?;
        let jobs: Vec<(usize, usize)> = (0..configs.len())
            .flat_map(|c| (0..splits.len()).map(move |f| (c, f)))
            .collect();

        let scores = ordered_map(self.pool, &jobs, |&(c, f)| {
            self.score_fold(&configs[c], &splits[f], x, y)
        });

        let n_folds = splits.len();
        let mut cv_results = Vec::with_capacity(configs.len());
        for (c, params) in configs.into_iter().enumerate() {
            let fold_scores: Vec<f64> = scores[c * n_folds..(c + 1) * n_folds]
                .iter()
                .enumerate()
                .map(|(fold, score)| match score {
                    Ok(s) => *s,
                    Err(e) => {
                        warn!(family = %self.family, params = %describe(&params), fold, error = %e, "fold fit failed");
                        f64::NAN
                    }
                })
                .collect();
            let mean_score = fold_scores.iter().sum::<f64>() / n_folds as f64;
            debug!(family = %self.family, params = %describe(&params), mean_score, "scored configuration");
            cv_results.push(CVResult {
                params,
                fold_scores,
                mean_score,
            });
        }

        let best = cv_results
            .iter()
            .filter(|r| r.mean_score.is_finite())
            .fold(None::<&CVResult>, |best, r| match best {
                Some(b) if b.mean_score >= r.mean_score => Some(b),
                _ => Some(r),
            })
            .ok_or_else(|| {
                PhishGuardError::training(format!("{}: every configuration failed to fit", self.family))
            })?;

        Ok(GridSearchResult {
            family: self.family,
            best_params: best.params.clone(),
            best_score: best.mean_score,
            cv_results,
        })
    }
}
