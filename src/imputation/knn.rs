//! KNN-based imputation
//!
//! For each missing cell, the donors are the fitted rows where that feature
//! is observed. Distances are NaN-aware Euclidean: squared differences over
//! the coordinates present in both rows, scaled by
//! `n_features / n_present`. Donors sharing no observed coordinate with the
//! receiver are skipped. With no usable donor the column mean is used.

use crate::error::{PhishGuardError, Result};
use crate::imputation::{is_missing, Imputer};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::warn;

/// Candidate donor ordered by distance, then row index
#[derive(Debug, Clone, Copy)]
struct DistanceIdx(f64, usize);

impl PartialEq for DistanceIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistanceIdx {}

impl PartialOrd for DistanceIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max heap: the worst kept donor sits on top
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// KNN-based imputer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNImputer {
    /// Number of neighbors
    n_neighbors: usize,
    /// Rows seen at fit time, missing cells included
    #[serde(with = "missing_cells")]
    fit_data: Option<Array2<f64>>,
    /// Observed-value mean per column; 0 for columns with no observation
    column_means: Option<Array1<f64>>,
}

impl KNNImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            fit_data: None,
            column_means: None,
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn is_fitted(&self) -> bool {
        self.fit_data.is_some()
    }

    /// NaN-aware Euclidean distance; None when no coordinate is shared
    fn nan_euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
        let mut present = 0usize;
        let mut accum = 0.0f64;
        for (&ai, &bi) in a.iter().zip(b.iter()) {
            if is_missing(ai) || is_missing(bi) {
                continue;
            }
            present += 1;
            let d = ai - bi;
            accum += d * d;
        }

        if present == 0 {
            return None;
        }
        Some((accum * a.len() as f64 / present as f64).sqrt())
    }

    /// k nearest donors for `feature_idx`, nearest first
    fn find_donors(&self, data: &Array2<f64>, distances: &[Option<f64>], feature_idx: usize) -> Vec<DistanceIdx> {
        let k = self.n_neighbors;
        let mut heap: BinaryHeap<DistanceIdx> = BinaryHeap::with_capacity(k + 1);

        for (i, dist) in distances.iter().enumerate() {
            let Some(d) = *dist else { continue };
            if is_missing(data[[i, feature_idx]]) {
                continue;
            }
            let candidate = DistanceIdx(d, i);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec()
    }

    fn impute_value(data: &Array2<f64>, donors: &[DistanceIdx], feature_idx: usize, mean: f64) -> f64 {
        if donors.is_empty() {
            return mean;
        }

        let sum: f64 = donors.iter().map(|d| data[[d.1, feature_idx]]).sum();
        sum / donors.len() as f64
    }

    fn impute_row(&self, row: ArrayView1<f64>, data: &Array2<f64>, means: &Array1<f64>) -> Vec<f64> {
        let mut out = row.to_vec();
        let missing: Vec<usize> = (0..out.len()).filter(|&j| is_missing(out[j])).collect();
        if missing.is_empty() {
            return out;
        }

        let distances: Vec<Option<f64>> = data
            .rows()
            .into_iter()
            .map(|fit_row| Self::nan_euclidean(row, fit_row))
            .collect();

        for j in missing {
            let donors = self.find_donors(data, &distances, j);
            out[j] = Self::impute_value(data, &donors, j, means[j]);
        }
        out
    }
}

/// Fit rows as JSON: missing cells become `null`, which `f64` cannot hold
mod missing_cells {
    use ndarray::Array2;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Cells {
        shape: (usize, usize),
        data: Vec<Option<f64>>,
    }

    pub fn serialize<S: Serializer>(value: &Option<Array2<f64>>, serializer: S) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(|array| Cells {
                shape: array.dim(),
                data: array.iter().map(|&v| if v.is_nan() { None } else { Some(v) }).collect(),
            })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Array2<f64>>, D::Error> {
        Option::<Cells>::deserialize(deserializer)?
            .map(|cells| {
                let data = cells.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                Array2::from_shape_vec(cells.shape, data).map_err(D::Error::custom)
            })
            .transpose()
    }
}

impl Default for KNNImputer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Imputer for KNNImputer {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PhishGuardError::invalid_input("cannot fit KNN imputer on zero rows"));
        }

        let means: Array1<f64> = x
            .columns()
            .into_iter()
            .enumerate()
            .map(|(j, col)| {
                let observed: Vec<f64> = col.iter().copied().filter(|v| !is_missing(*v)).collect();
                if observed.is_empty() {
                    warn!(column = j, "column has no observed values, imputing 0");
                    0.0
                } else {
                    observed.iter().sum::<f64>() / observed.len() as f64
                }
            })
            .collect();

        self.fit_data = Some(x.clone());
        self.column_means = Some(means);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (data, means) = match (&self.fit_data, &self.column_means) {
            (Some(d), Some(m)) => (d, m),
            _ => return Err(PhishGuardError::invalid_input("KNN imputer not fitted")),
        };

        if x.ncols() != data.ncols() {
            return Err(PhishGuardError::shape(
                format!("{} columns", data.ncols()),
                format!("{} columns", x.ncols()),
            ));
        }

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.impute_row(x.row(i), data, means))
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), x.ncols()), flat)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_imputer_basic() {
        let data = Array2::from_shape_vec(
            (6, 2),
            vec![
                1.0, 10.0,
                2.0, 20.0,
                3.0, 30.0,
                4.0, 40.0,
                f64::NAN, 25.0, // Missing first feature
                2.5, f64::NAN, // Missing second feature
            ],
        ).unwrap();

        let mut imputer = KNNImputer::new(3);
        let result = imputer.fit_transform(&data).unwrap();

        assert!(!result.iter().any(|&v| v.is_nan()));
        assert!(result[[4, 0]] >= 1.0 && result[[4, 0]] <= 4.0);
        assert!(result[[5, 1]] >= 10.0 && result[[5, 1]] <= 40.0);
    }

    #[test]
    fn test_uses_rows_with_other_gaps_as_donors() {
        // Row 2 is incomplete but still donates its observed first feature
        let data = Array2::from_shape_vec(
            (3, 3),
            vec![
                1.0, 1.0, f64::NAN,
                1.0, f64::NAN, 5.0,
                9.0, 9.0, 9.0,
            ],
        ).unwrap();

        let mut imputer = KNNImputer::new(1);
        let result = imputer.fit_transform(&data).unwrap();
        // Row 0 is nearest to row 1 (distance 0 on the shared feature)
        assert_eq!(result[[0, 2]], 5.0);
        assert_eq!(result[[1, 1]], 1.0);
    }

    #[test]
    fn test_nan_euclidean_scaling() {
        let a = Array1::from_vec(vec![1.0, f64::NAN, 3.0, 0.0]);
        let b = Array1::from_vec(vec![2.0, 5.0, f64::NAN, 0.0]);
        // shared coords: 0 and 3, sq sum = 1, weight = 4 / 2
        let d = KNNImputer::nan_euclidean(a.view(), b.view()).unwrap();
        assert!((d - 2.0f64.sqrt()).abs() < 1e-12);

        let c = Array1::from_vec(vec![f64::NAN, f64::NAN, f64::NAN, f64::NAN]);
        assert!(KNNImputer::nan_euclidean(a.view(), c.view()).is_none());
    }

    #[test]
    fn test_falls_back_to_column_mean() {
        // The receiver shares no observed coordinate with any donor
        let fit = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let query = Array2::from_shape_vec((1, 2), vec![f64::NAN, f64::NAN]).unwrap();

        let mut imputer = KNNImputer::new(2);
        imputer.fit(&fit).unwrap();
        let result = imputer.transform(&query).unwrap();
        assert_eq!(result[[0, 0]], 2.0);
        assert_eq!(result[[0, 1]], 3.0);
    }

    #[test]
    fn test_all_missing_column_imputes_zero() {
        let data = Array2::from_shape_vec((2, 2), vec![1.0, f64::NAN, 2.0, f64::NAN]).unwrap();
        let mut imputer = KNNImputer::new(1);
        let result = imputer.fit_transform(&data).unwrap();
        assert_eq!(result[[0, 1]], 0.0);
        assert_eq!(result[[1, 1]], 0.0);
    }

    #[test]
    fn test_complete_rows_unchanged() {
        let data = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0]).unwrap();
        let mut imputer = KNNImputer::new(2);
        imputer.fit(&data).unwrap();

        let once = imputer.transform(&data).unwrap();
        let twice = imputer.transform(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once[[0, 0]], 1.0);
        assert_eq!(once[[2, 1]], 6.0);
    }

    #[test]
    fn test_fitted_imputer_survives_json() {
        let data = Array2::from_shape_vec((3, 2), vec![1.0, 4.0, f64::NAN, 5.0, 3.0, f64::NAN]).unwrap();
        let mut imputer = KNNImputer::new(1);
        imputer.fit(&data).unwrap();

        let json = serde_json::to_string(&imputer).unwrap();
        let restored: KNNImputer = serde_json::from_str(&json).unwrap();
        assert!(restored.is_fitted());
        assert_eq!(restored.n_neighbors(), 1);

        let query = Array2::from_shape_vec((2, 2), vec![f64::NAN, 4.0, 3.0, f64::NAN]).unwrap();
        assert_eq!(restored.transform(&query).unwrap(), imputer.transform(&query).unwrap());
    }

    #[test]
    fn test_single_missing_cell_round_trip() {
        let data = Array2::from_shape_vec((2, 1), vec![1.0, f64::NAN]).unwrap();
        let mut imputer = KNNImputer::new(1);
        imputer.fit(&data).unwrap();

        let json = serde_json::to_string(&imputer).unwrap();
        assert!(json.contains("null"));
        let restored: KNNImputer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.transform(&data).unwrap()[[1, 0]], 1.0);

        let unfitted: KNNImputer = serde_json::from_str(&serde_json::to_string(&KNNImputer::new(2)).unwrap()).unwrap();
        assert!(!unfitted.is_fitted());
    }

    #[test]
    fn test_transform_requires_fit() {
        let imputer = KNNImputer::new(3);
        let x = Array2::<f64>::zeros((1, 1));
        assert!(imputer.transform(&x).is_err());
    }
}
