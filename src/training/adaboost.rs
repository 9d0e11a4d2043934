//! AdaBoost (SAMME) with depth-1 trees
//!
//! Each round fits a weighted stump, scores it by its weighted error and
//! up-weights the rows it got wrong.

use super::decision_tree::DecisionTree;
use super::linear_models::sigmoid;
use crate::error::{ErrorKind, PhishGuardError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// AdaBoost classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    stumps: Vec<DecisionTree>,
    alphas: Vec<f64>,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            stumps: Vec::new(),
            alphas: Vec::new(),
        }
    }

    pub fn n_rounds(&self) -> usize {
        self.stumps.len()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PhishGuardError::shape(
                format!("{n_samples} targets"),
                format!("{} targets", y.len()),
            ));
        }
        if n_samples == 0 || self.n_estimators == 0 {
            return Err(PhishGuardError::training(
                "AdaBoost needs samples and at least one round",
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(PhishGuardError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        self.stumps.clear();
        self.alphas.clear();

        let indices: Vec<usize> = (0..n_samples).collect();
        let mut weights = vec![1.0 / n_samples as f64; n_samples];

        for round in 0..self.n_estimators {
            let mut stump = DecisionTree::new_classifier().with_max_depth(Some(1));
            stump.fit_subset(x, y, &indices, &weights)?;

            let predicted = stump.predict_value(x)?.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 });
            let incorrect: Vec<bool> = predicted.iter().zip(y.iter()).map(|(p, t)| p != t).collect();

            let total: f64 = weights.iter().sum();
            let error = weights
                .iter()
                .zip(&incorrect)
                .filter(|(_, &wrong)| wrong)
                .map(|(w, _)| w)
                .sum::<f64>()
                / total;

            if error <= 0.0 {
                // Perfect stump: keep it with unit weight and stop
                self.stumps.push(stump);
                self.alphas.push(1.0);
                break;
            }

            if error >= 0.5 {
                if round == 0 {
                    return Err(PhishGuardError::training(
                        "AdaBoost base estimator is no better than chance",
                    ));
                }
                break;
            }

            let alpha = self.learning_rate * ((1.0 - error) / error).ln();
            self.stumps.push(stump);
            self.alphas.push(alpha);

            if round + 1 < self.n_estimators {
                for (w, &wrong) in weights.iter_mut().zip(&incorrect) {
                    if wrong {
                        *w *= alpha.exp();
                    }
                }
                let sum: f64 = weights.iter().sum();
                if !(sum > 0.0 && sum.is_finite()) {
                    break;
                }
                weights.iter_mut().for_each(|w| *w /= sum);
            }
        }

        Ok(())
    }

    /// Normalized vote margin in `[-1, 1]`, positive favours class 1
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stumps.is_empty() {
            return Err(PhishGuardError::new(ErrorKind::ModelNotFitted));
        }
        let mut score = Array1::<f64>::zeros(x.nrows());
        for (stump, &alpha) in self.stumps.iter().zip(&self.alphas) {
            let votes = stump.predict_value(x)?.mapv(|p| if p > 0.5 { alpha } else { -alpha });
            score += &votes;
        }
        let total: f64 = self.alphas.iter().sum();
        Ok(score / total)
    }

    /// P(y = 1)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_stump_stops_early() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut ada = AdaBoostClassifier::new(10, 1.0);
        ada.fit(&x, &y).unwrap();
        assert_eq!(ada.n_rounds(), 1);

        let d = ada.decision_function(&x).unwrap();
        assert_eq!(d.to_vec(), vec![-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_boosting_combines_stumps() {
        // Positive only when both features are high
        let x = array![
            [0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0],
            [0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut ada = AdaBoostClassifier::new(20, 1.0);
        ada.fit(&x, &y).unwrap();
        assert!(ada.n_rounds() > 1);

        let p = ada.predict_proba(&x).unwrap();
        assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_unfitted() {
        let ada = AdaBoostClassifier::default();
        assert!(ada.decision_function(&array![[1.0]]).is_err());
    }
}
