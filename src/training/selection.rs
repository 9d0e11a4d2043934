//! Model selection and promotion gates
//!
//! Each candidate family is grid searched, its best configuration is
//! wrapped in sigmoid calibration and refit on the full training split,
//! then scored on both splits. The highest test accuracy wins, with ties
//! going to the earlier candidate. The winner must clear the accuracy and
//! generalization-gap gates to be promoted.

use super::grid_search::GridSearch;
use super::metrics::ClassificationMetrics;
use super::models::{Classifier, ModelFamily};
use super::params::{describe, ParamGrid, ParamSet};
use crate::calibration::CalibratedClassifier;
use crate::config::TrainerConfig;
use crate::error::{ErrorKind, PhishGuardError, Result};
use crate::utils::build_pool;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// A family and the grid searched for it
#[derive(Debug, Clone)]
pub struct CandidateModel {
    pub family: ModelFamily,
    pub grid: ParamGrid,
}

impl CandidateModel {
    pub fn new(family: ModelFamily, grid: ParamGrid) -> Self {
        Self { family, grid }
    }

    /// Family with its built-in grid
    pub fn with_default_grid(family: ModelFamily) -> Self {
        Self::new(family, family.default_grid())
    }
}

/// How one candidate fared
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateReport {
    pub family: ModelFamily,
    pub best_params: ParamSet,
    /// Mean cross-validated accuracy of `best_params`
    pub cv_score: f64,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
}

/// The promoted model and the scores of every candidate
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub model: CalibratedClassifier,
    pub winner: CandidateReport,
    pub reports: Vec<CandidateReport>,
}

/// Minimum quality a winner must show
#[derive(Debug, Clone, Copy)]
pub struct PromotionGates {
    pub expected_accuracy: f64,
    pub max_accuracy_gap: f64,
}

impl PromotionGates {
    /// Check the winner; the accuracy gate is checked first
    pub fn check(&self, report: &CandidateReport) -> Result<()> {
        let train = report.train_metrics.accuracy;
        let test = report.test_metrics.accuracy;

        if test < self.expected_accuracy {
            return Err(PhishGuardError::new(ErrorKind::AccuracyBelowExpected {
                family: report.family.to_string(),
                test_accuracy: test,
                expected: self.expected_accuracy,
            }));
        }

        let gap = (train - test).abs();
        if gap > self.max_accuracy_gap {
            return Err(PhishGuardError::new(ErrorKind::GeneralizationGap {
                family: report.family.to_string(),
                train_accuracy: train,
                test_accuracy: test,
                gap,
                max_gap: self.max_accuracy_gap,
            }));
        }
        Ok(())
    }
}

/// Searches the registry and promotes one model
#[derive(Debug, Clone)]
pub struct ModelSelector {
    candidates: Vec<CandidateModel>,
    gates: PromotionGates,
    cv_folds: usize,
    calibration_folds: usize,
    n_jobs: Option<usize>,
    random_state: u64,
}

impl ModelSelector {
    pub fn new(candidates: Vec<CandidateModel>, gates: PromotionGates) -> Self {
        Self {
            candidates,
            gates,
            cv_folds: 5,
            calibration_folds: 3,
            n_jobs: None,
            random_state: 42,
        }
    }

    /// Selector over the configured families with their built-in grids
    pub fn from_config(config: &TrainerConfig) -> Self {
        let candidates = config
            .families
            .iter()
            .map(|&family| CandidateModel::with_default_grid(family))
            .collect();
        let gates = PromotionGates {
            expected_accuracy: config.expected_accuracy,
            max_accuracy_gap: config.max_accuracy_gap,
        };
        Self {
            cv_folds: config.cv_folds,
            calibration_folds: config.calibration_folds,
            n_jobs: config.n_jobs,
            random_state: config.random_state,
            ..Self::new(candidates, gates)
        }
    }

    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn candidates(&self) -> &[CandidateModel] {
        &self.candidates
    }

    /// Search, calibrate and score one candidate
    fn evaluate(
        &self,
        candidate: &CandidateModel,
        pool: &rayon::ThreadPool,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<(CalibratedClassifier, CandidateReport)> {
        let search = GridSearch::new(candidate.family, candidate.grid.clone(), pool)
            .with_folds(self.cv_folds)
            .with_random_state(self.random_state)
            .fit(x_train, y_train)?;

        let base = candidate.family.build(&search.best_params, self.random_state)?;
        let mut model = CalibratedClassifier::new(base, self.calibration_folds);
        pool.install(|| model.fit(x_train, y_train))?;

        let train_metrics = ClassificationMetrics::compute(y_train, &model.predict(x_train)?)?;
        let test_metrics = ClassificationMetrics::compute(y_test, &model.predict(x_test)?)?;

        info!(
            family = %candidate.family,
            params = %describe(&search.best_params),
            cv_score = search.best_score,
            train_accuracy = train_metrics.accuracy,
            test_accuracy = test_metrics.accuracy,
            "evaluated candidate"
        );

        let report = CandidateReport {
            family: candidate.family,
            best_params: search.best_params,
            cv_score: search.best_score,
            train_metrics,
            test_metrics,
        };
        Ok((model, report))
    }

    /// Evaluate every candidate, pick the winner and enforce the gates
    pub fn select(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<SelectionOutcome> {
        if self.candidates.is_empty() {
            return Err(PhishGuardError::config("model registry is empty"));
        }
        if x_train.ncols() != x_test.ncols() {
            return Err(PhishGuardError::shape(
                format!("{} test features", x_train.ncols()),
                format!("{} test features", x_test.ncols()),
            ));
        }

        let pool = build_pool(self.n_jobs)?;
        let mut best: Option<(CalibratedClassifier, CandidateReport)> = None;
        let mut reports = Vec::with_capacity(self.candidates.len());

        for candidate in &self.candidates {
            let (model, report) = self.evaluate(candidate, &pool, x_train, y_train, x_test, y_test)?;
            reports.push(report.clone());

            let better = best
                .as_ref()
                .map_or(true, |(_, b)| report.test_metrics.accuracy > b.test_metrics.accuracy);
            if better {
                best = Some((model, report));
            }
        }

        let (model, winner) = best.ok_or_else(|| PhishGuardError::training("no candidate was evaluated"))?;
        info!(
            family = %winner.family,
            test_accuracy = winner.test_metrics.accuracy,
            train_accuracy = winner.train_metrics.accuracy,
            "best model"
        );

        if let Err(e) = self.gates.check(&winner) {
            error!(error = %e, "promotion gate failed");
            return Err(e);
        }

        Ok(SelectionOutcome { model, winner, reports })
    }
}
