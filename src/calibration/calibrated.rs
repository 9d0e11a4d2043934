//! Cross-validated probability calibration around a base estimator

use super::{Calibrator, PlattScaling};
use crate::error::{ErrorKind, PhishGuardError, Result};
use crate::training::{Classifier, Estimator, ModelFamily, StratifiedKFold};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One fold: an estimator fit on the other folds and a sigmoid fit on this one
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibratedFold {
    estimator: Estimator,
    calibrator: PlattScaling,
}

/// Estimator wrapped in k-fold sigmoid calibration
///
/// `fit` splits the data with unshuffled stratified k-fold. For each fold a
/// fresh copy of the base estimator is trained on the remaining folds and a
/// Platt sigmoid is fit on its scores for the held-out fold. Probabilities
/// are the mean of the per-fold calibrated probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratedClassifier {
    base: Estimator,
    n_folds: usize,
    folds: Vec<CalibratedFold>,
}

impl CalibratedClassifier {
    pub fn new(base: Estimator, n_folds: usize) -> Self {
        Self {
            base,
            n_folds,
            folds: Vec::new(),
        }
    }

    pub fn family(&self) -> ModelFamily {
        self.base.family()
    }

    pub fn is_fitted(&self) -> bool {
        !self.folds.is_empty()
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }
}

impl Classifier for CalibratedClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PhishGuardError::shape(
                format!("{} labels", x.nrows()),
                format!("{} labels", y.len()),
            ));
        }

        let splits = StratifiedKFold::new(self.n_folds).split(y)?;
        let mut folds = Vec::with_capacity(splits.len());

        for split in &splits {
            let x_fit = x.select(Axis(0), &split.train_indices);
            let y_fit = y.select(Axis(0), &split.train_indices);
            let x_cal = x.select(Axis(0), &split.test_indices);
            let y_cal = y.select(Axis(0), &split.test_indices);

            let mut estimator = self.base.clone();
            estimator.fit(&x_fit, &y_fit)?;

            let mut calibrator = PlattScaling::new();
            calibrator.fit(&estimator.decision_function(&x_cal)?, &y_cal)?;
            debug!(
                family = %self.base.family(),
                fold = split.fold_idx,
                params = ?calibrator.parameters(),
                "calibrated fold"
            );

            folds.push(CalibratedFold { estimator, calibrator });
        }

        self.folds = folds;
        Ok(())
    }

    /// Mean calibrated score; identical to `predict_proba`
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_proba(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.folds.is_empty() {
            return Err(PhishGuardError::new(ErrorKind::ModelNotFitted));
        }
        let mut total = Array1::<f64>::zeros(x.nrows());
        for fold in &self.folds {
            let scores = fold.estimator.decision_function(x)?;
            total += &fold.calibrator.calibrate(&scores)?;
        }
        Ok(total / self.folds.len() as f64)
    }
}
