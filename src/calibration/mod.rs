//! Probability calibration
//!
//! - Platt scaling (sigmoid calibration) on raw classifier scores
//! - Cross-validated calibration wrapper used for the shipped model

mod calibrated;
mod platt;

pub use calibrated::CalibratedClassifier;
pub use platt::PlattScaling;

use crate::error::Result;
use ndarray::Array1;

/// Trait for score calibrators
pub trait Calibrator: Send + Sync {
    /// Fit the calibrator on raw scores and true labels
    fn fit(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<()>;

    /// Map raw scores to probabilities
    fn calibrate(&self, scores: &Array1<f64>) -> Result<Array1<f64>>;
}
