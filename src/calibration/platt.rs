//! Platt scaling (sigmoid calibration)

use crate::calibration::Calibrator;
use crate::error::{PhishGuardError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Platt scaling calibrator
///
/// Fits `P(y=1|f) = 1 / (1 + exp(A*f + B))` on raw classifier scores `f`,
/// using smoothed targets `(n_pos+1)/(n_pos+2)` and `1/(n_neg+2)` and a
/// Newton solver with backtracking line search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaling {
    /// Slope parameter A
    a: Option<f64>,
    /// Intercept parameter B
    b: Option<f64>,
    /// Maximum iterations
    max_iter: usize,
    /// Convergence tolerance on the gradient
    tol: f64,
}

const MIN_STEP: f64 = 1e-10;
const HESSIAN_RIDGE: f64 = 1e-12;

impl PlattScaling {
    /// Create new Platt scaling calibrator
    pub fn new() -> Self {
        Self {
            a: None,
            b: None,
            max_iter: 100,
            tol: 1e-5,
        }
    }

    /// Get fitted parameters `(A, B)`
    pub fn parameters(&self) -> Option<(f64, f64)> {
        match (self.a, self.b) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// `1 / (1 + exp(z))` without overflow
    fn prob(z: f64) -> f64 {
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }

    /// Cross-entropy against the smoothed targets
    fn objective(scores: &Array1<f64>, targets: &[f64], a: f64, b: f64) -> f64 {
        scores
            .iter()
            .zip(targets)
            .map(|(&f, &t)| {
                let z = a * f + b;
                if z >= 0.0 {
                    t * z + (-z).exp().ln_1p()
                } else {
                    (t - 1.0) * z + z.exp().ln_1p()
                }
            })
            .sum()
    }
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator for PlattScaling {
    fn fit(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
        let n = scores.len();
        if n != labels.len() {
            return Err(PhishGuardError::shape(
                format!("{n} labels"),
                format!("{} labels", labels.len()),
            ));
        }
        if n == 0 {
            return Err(PhishGuardError::invalid_input("cannot calibrate on an empty score set"));
        }

        let n_pos = labels.iter().filter(|&&y| y > 0.5).count() as f64;
        let n_neg = n as f64 - n_pos;
        let target_pos = (n_pos + 1.0) / (n_pos + 2.0);
        let target_neg = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&y| if y > 0.5 { target_pos } else { target_neg })
            .collect();

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut fval = Self::objective(scores, &targets, a, b);

        for _ in 0..self.max_iter {
            let (mut h11, mut h22, mut h21) = (HESSIAN_RIDGE, HESSIAN_RIDGE, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);

            for (&f, &t) in scores.iter().zip(&targets) {
                let p = Self::prob(a * f + b);
                let d2 = p * (1.0 - p);
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < self.tol && g2.abs() < self.tol {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            if det.abs() < f64::EPSILON {
                break;
            }
            let delta_a = -(h22 * g1 - h21 * g2) / det;
            let delta_b = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * delta_a + g2 * delta_b;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let new_a = a + step * delta_a;
                let new_b = b + step * delta_b;
                let new_f = Self::objective(scores, &targets, new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                break;
            }
        }

        self.a = Some(a);
        self.b = Some(b);
        Ok(())
    }

    fn calibrate(&self, scores: &Array1<f64>) -> Result<Array1<f64>> {
        let (a, b) = self
            .parameters()
            .ok_or_else(|| PhishGuardError::training("calibrator not fitted"))?;
        Ok(scores.mapv(|f| Self::prob(a * f + b)))
    }
}
