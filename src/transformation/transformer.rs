//! Fitted feature transformer

use crate::error::{PhishGuardError, Result};
use crate::imputation::{Imputer, KNNImputer};
use crate::utils::frame_to_array;
use ndarray::{concatenate, Array2, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Columns whose `-1` means "not computed" rather than a category code
pub const CONTINUOUS_FEATURES: [&str; 6] = [
    "Domain_registeration_length",
    "age_of_domain",
    "web_traffic",
    "Page_Rank",
    "Links_pointing_to_page",
    "Statistical_report",
];

/// Upstream marker for an unknown feature value
pub const MISSING_SENTINEL: f64 = -1.0;

/// Declares the transformer's shape before fitting
#[derive(Debug, Clone)]
pub struct TransformerBuilder {
    continuous: Vec<String>,
    n_neighbors: usize,
}

impl Default for TransformerBuilder {
    fn default() -> Self {
        Self {
            continuous: CONTINUOUS_FEATURES.iter().map(|s| s.to_string()).collect(),
            n_neighbors: 3,
        }
    }
}

impl TransformerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the continuous column set
    pub fn with_continuous<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.continuous = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_n_neighbors(mut self, n: usize) -> Self {
        self.n_neighbors = n;
        self
    }

    /// Unfitted transformer
    pub fn build(&self) -> FeatureTransformer {
        FeatureTransformer {
            continuous_columns: self.continuous.clone(),
            input_columns: Vec::new(),
            passthrough_columns: Vec::new(),
            sentinel: MISSING_SENTINEL,
            imputer: KNNImputer::new(self.n_neighbors),
            fitted: false,
        }
    }
}

/// Maps raw feature rows to numeric model input
///
/// Continuous columns: sentinel to missing, then KNN imputation. Every other
/// column passes through unchanged. Output order is the continuous columns
/// followed by the passthrough columns in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTransformer {
    continuous_columns: Vec<String>,
    /// Feature columns in the order seen at fit time
    input_columns: Vec<String>,
    passthrough_columns: Vec<String>,
    sentinel: f64,
    imputer: KNNImputer,
    fitted: bool,
}

impl FeatureTransformer {
    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Feature columns the transformer expects, in input order
    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    /// Column names of the transformed matrix
    pub fn output_columns(&self) -> Vec<String> {
        self.continuous_columns
            .iter()
            .chain(self.passthrough_columns.iter())
            .cloned()
            .collect()
    }

    pub fn n_features(&self) -> usize {
        self.input_columns.len()
    }

    /// Fit on a feature frame (label already removed)
    pub fn fit(&mut self, features: &DataFrame) -> Result<()> {
        let names: Vec<String> = features
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        let absent: Vec<&String> = self
            .continuous_columns
            .iter()
            .filter(|c| !names.contains(c))
            .collect();
        if !absent.is_empty() {
            return Err(PhishGuardError::data(format!(
                "continuous columns missing from training frame: {absent:?}"
            )));
        }

        self.passthrough_columns = names
            .iter()
            .filter(|n| !self.continuous_columns.contains(n))
            .cloned()
            .collect();
        self.input_columns = names;

        let continuous = self.mask_sentinel(frame_to_array(features, &self.continuous_columns)?);
        self.imputer.fit(&continuous)?;
        self.fitted = true;

        debug!(
            continuous = self.continuous_columns.len(),
            passthrough = self.passthrough_columns.len(),
            "fitted feature transformer"
        );
        Ok(())
    }

    /// Transform a feature frame; extra columns are ignored
    pub fn transform(&self, features: &DataFrame) -> Result<Array2<f64>> {
        self.ensure_fitted()?;
        let continuous = self.mask_sentinel(frame_to_array(features, &self.continuous_columns)?);
        let passthrough = frame_to_array(features, &self.passthrough_columns)?;
        self.assemble(continuous, passthrough)
    }

    /// Transform rows whose columns follow `input_columns()` order
    pub fn transform_rows(&self, rows: &Array2<f64>) -> Result<Array2<f64>> {
        self.ensure_fitted()?;
        if rows.ncols() != self.input_columns.len() {
            return Err(PhishGuardError::shape(
                format!("{} features", self.input_columns.len()),
                format!("{} features", rows.ncols()),
            ));
        }

        let positions = |columns: &[String]| -> Vec<usize> {
            columns
                .iter()
                .filter_map(|c| self.input_columns.iter().position(|i| i == c))
                .collect()
        };
        let continuous = self.mask_sentinel(rows.select(Axis(1), &positions(&self.continuous_columns)));
        let passthrough = rows.select(Axis(1), &positions(&self.passthrough_columns));
        self.assemble(continuous, passthrough)
    }

    fn assemble(&self, continuous: Array2<f64>, passthrough: Array2<f64>) -> Result<Array2<f64>> {
        let imputed = self.imputer.transform(&continuous)?;
        Ok(concatenate(Axis(1), &[imputed.view(), passthrough.view()])?)
    }

    fn mask_sentinel(&self, mut x: Array2<f64>) -> Array2<f64> {
        let sentinel = self.sentinel;
        x.mapv_inplace(|v| if v == sentinel { f64::NAN } else { v });
        x
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.fitted {
            Ok(())
        } else {
            Err(PhishGuardError::new(crate::error::ErrorKind::ModelNotFitted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn features() -> DataFrame {
        df!(
            "flag" => &[1.0, -1.0, 0.0, 1.0],
            "web_traffic" => &[1.0, -1.0, 0.0, 1.0],
            "Page_Rank" => &[-1.0, 1.0, 1.0, -1.0]
        )
        .unwrap()
    }

    fn builder() -> TransformerBuilder {
        TransformerBuilder::new()
            .with_continuous(["web_traffic", "Page_Rank"])
            .with_n_neighbors(2)
    }

    #[test]
    fn test_output_order_continuous_first() {
        let mut t = builder().build();
        t.fit(&features()).unwrap();
        assert_eq!(t.output_columns(), vec!["web_traffic", "Page_Rank", "flag"]);
        assert_eq!(t.input_columns(), &["flag", "web_traffic", "Page_Rank"]);
    }

    #[test]
    fn test_sentinel_removed_and_passthrough_identical() {
        let df = features();
        let mut t = builder().build();
        t.fit(&df).unwrap();
        let out = t.transform(&df).unwrap();

        for j in 0..2 {
            assert!(out.column(j).iter().all(|&v| v != MISSING_SENTINEL && !v.is_nan()));
        }
        // passthrough keeps its own -1
        assert_eq!(out.column(2).to_vec(), vec![1.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_transform_rows_matches_frame() {
        let df = features();
        let mut t = builder().build();
        t.fit(&df).unwrap();

        let raw = frame_to_array(&df, t.input_columns()).unwrap();
        assert_eq!(t.transform_rows(&raw).unwrap(), t.transform(&df).unwrap());

        let bad = Array2::<f64>::zeros((1, 2));
        assert!(t.transform_rows(&bad).is_err());
    }

    #[test]
    fn test_fit_requires_continuous_columns() {
        let df = df!("flag" => &[1.0, 0.0]).unwrap();
        let mut t = builder().build();
        assert!(t.fit(&df).is_err());
    }

    #[test]
    fn test_transform_before_fit() {
        let t = builder().build();
        assert!(t.transform(&features()).is_err());
    }
}
