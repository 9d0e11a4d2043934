//! L2-regularized logistic regression

use crate::error::{ErrorKind, PhishGuardError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a * x = b` by Cholesky
/// decomposition. A near-singular matrix gets a small ridge on the diagonal
/// and one retry.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    cholesky_solve_inner(a, b).or_else(|| {
        let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += ridge.max(1e-12);
        }
        cholesky_solve_inner(&a_reg, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// log(1 + exp(z)) without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Logistic regression
///
/// Minimizes `0.5 * ||w||^2 + C * sum(logloss)` with an unpenalized
/// intercept, using Newton steps with a backtracking line search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum Newton iterations
    pub max_iter: usize,
    /// Stop when the gradient's max-norm falls below this
    pub tol: f64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn objective(&self, x: &Array2<f64>, y: &Array1<f64>, w: &Array1<f64>, b: f64) -> f64 {
        let z = x.dot(w) + b;
        let loss: f64 = z
            .iter()
            .zip(y.iter())
            .map(|(&zi, &yi)| softplus(zi) - yi * zi)
            .sum();
        0.5 * w.dot(w) + self.c * loss
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(PhishGuardError::shape(
                format!("{n_samples} targets"),
                format!("{} targets", y.len()),
            ));
        }
        if n_samples == 0 {
            return Err(PhishGuardError::training("cannot fit logistic regression on zero samples"));
        }
        if self.c <= 0.0 || !self.c.is_finite() {
            return Err(PhishGuardError::config(format!("C must be positive, got {}", self.c)));
        }

        let mut w = Array1::<f64>::zeros(n_features);
        let mut b = 0.0;
        let mut current = self.objective(x, y, &w, b);

        for _ in 0..self.max_iter {
            let z = x.dot(&w) + b;
            let p = z.mapv(sigmoid);
            let residual = &p - y;
            let curvature = p.mapv(|pi| (pi * (1.0 - pi)).max(1e-12));

            // Gradient over [w, b]
            let mut grad = Array1::<f64>::zeros(n_features + 1);
            grad.slice_mut(ndarray::s![..n_features])
                .assign(&(&w + &(x.t().dot(&residual) * self.c)));
            grad[n_features] = self.c * residual.sum();

            if grad.iter().fold(0.0f64, |m, g| m.max(g.abs())) < self.tol {
                break;
            }

            // Hessian over [w, b]
            let weighted = x * &curvature.view().insert_axis(Axis(1));
            let mut hess = Array2::<f64>::zeros((n_features + 1, n_features + 1));
            hess.slice_mut(ndarray::s![..n_features, ..n_features])
                .assign(&(x.t().dot(&weighted) * self.c));
            let col = weighted.sum_axis(Axis(0)) * self.c;
            for j in 0..n_features {
                hess[[j, j]] += 1.0;
                hess[[j, n_features]] = col[j];
                hess[[n_features, j]] = col[j];
            }
            hess[[n_features, n_features]] = self.c * curvature.sum() + 1e-10;

            let Some(step) = cholesky_solve(&hess, &grad) else {
                return Err(PhishGuardError::training("logistic regression Hessian is singular"));
            };

            let mut t = 1.0;
            let mut accepted = false;
            for _ in 0..30 {
                let w_new = &w - &(step.slice(ndarray::s![..n_features]).to_owned() * t);
                let b_new = b - t * step[n_features];
                let candidate = self.objective(x, y, &w_new, b_new);
                if candidate <= current {
                    w = w_new;
                    b = b_new;
                    let improvement = current - candidate;
                    current = candidate;
                    accepted = improvement > 0.0;
                    break;
                }
                t *= 0.5;
            }
            if !accepted {
                break;
            }
        }

        self.coefficients = Some(w);
        self.intercept = b;
        Ok(self)
    }

    /// Linear score `x . w + b`
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self
            .coefficients
            .as_ref()
            .ok_or_else(|| PhishGuardError::new(ErrorKind::ModelNotFitted))?;
        if x.ncols() != w.len() {
            return Err(PhishGuardError::shape(
                format!("{} features", w.len()),
                format!("{} features", x.ncols()),
            ));
        }
        Ok(x.dot(w) + self.intercept)
    }

    /// P(y = 1)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }
}
