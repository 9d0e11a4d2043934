//! Two-sample Kolmogorov-Smirnov test

use crate::drift::{ColumnDrift, DriftDetector};
use crate::error::{PhishGuardError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Statistic and two-sided p-value of a KS test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsOutcome {
    /// sup |F_ref(x) - F_cur(x)|
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample KS test with an asymptotic p-value
///
/// The p-value uses the Kolmogorov distribution with Stephens'
/// effective-size correction, `lambda = (sqrt(ne) + 0.12 + 0.11 / sqrt(ne)) * D`
/// with `ne = n * m / (n + m)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolmogorovSmirnovTest {
    /// Significance level (alpha)
    alpha: f64,
}

impl KolmogorovSmirnovTest {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(PhishGuardError::config(format!(
                "KS significance must be in (0, 1), got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    /// Run the test; NaN values are ignored
    pub fn compute(reference: &[f64], current: &[f64]) -> KsOutcome {
        let mut a: Vec<f64> = reference.iter().copied().filter(|v| !v.is_nan()).collect();
        let mut b: Vec<f64> = current.iter().copied().filter(|v| !v.is_nan()).collect();

        // An empty side carries no evidence either way
        if a.is_empty() || b.is_empty() {
            return KsOutcome { statistic: 0.0, p_value: 1.0 };
        }

        a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
        b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

        let statistic = Self::statistic(&a, &b);
        let n = a.len() as f64;
        let m = b.len() as f64;
        let en = (n * m / (n + m)).sqrt();
        let lambda = (en + 0.12 + 0.11 / en) * statistic;

        KsOutcome {
            statistic,
            p_value: kolmogorov_survival(lambda),
        }
    }

    /// Sweep both sorted samples, stepping over tied values together
    fn statistic(a: &[f64], b: &[f64]) -> f64 {
        let (n, m) = (a.len(), b.len());
        let (mut i, mut j) = (0usize, 0usize);
        let mut d = 0.0f64;

        while i < n && j < m {
            let x = if a[i] <= b[j] { a[i] } else { b[j] };
            while i < n && a[i] <= x {
                i += 1;
            }
            while j < m && b[j] <= x {
                j += 1;
            }
            let diff = (i as f64 / n as f64 - j as f64 / m as f64).abs();
            d = d.max(diff);
        }

        d
    }
}

impl Default for KolmogorovSmirnovTest {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

impl DriftDetector for KolmogorovSmirnovTest {
    fn detect(&self, reference: &[f64], current: &[f64]) -> ColumnDrift {
        let outcome = Self::compute(reference, current);
        ColumnDrift {
            p_value: outcome.p_value,
            drift_flag: outcome.p_value < self.alpha,
        }
    }

    fn significance(&self) -> f64 {
        self.alpha
    }
}

/// Q_KS(lambda) = 2 * sum_{k>=1} (-1)^(k-1) exp(-2 k^2 lambda^2), clamped to [0, 1]
pub fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }

    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0;

    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }

    // No convergence only happens for tiny lambda, where Q -> 1
    1.0
}
