//! Feature transformation stage
//!
//! Fits the [`FeatureTransformer`] on the training split only, transforms
//! both splits and appends the remapped label as the last column.

mod transformer;

pub use transformer::{FeatureTransformer, TransformerBuilder, CONTINUOUS_FEATURES, MISSING_SENTINEL};

use crate::artifacts::{RunLayout, TransformationArtifact, ValidationOutcome};
use crate::error::{PhishGuardError, Result};
use crate::utils::{column_values, load_json, save_json, DataLoader};
use ndarray::{concatenate, Array1, Array2, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// A transformed split: feature columns followed by the label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMatrix {
    pub columns: Vec<String>,
    pub data: Array2<f64>,
}

impl LabeledMatrix {
    /// Feature block (all but the last column)
    pub fn features(&self) -> Array2<f64> {
        let n = self.data.ncols().saturating_sub(1);
        self.data.slice(ndarray::s![.., ..n]).to_owned()
    }

    /// Label column
    pub fn labels(&self) -> Array1<f64> {
        let n = self.data.ncols().saturating_sub(1);
        self.data.column(n).to_owned()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Label encoding: raw `-1` becomes `0`, other values are kept
pub fn remap_labels(df: &DataFrame, target: &str) -> Result<Array1<f64>> {
    column_values(df, target)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(x) if x == -1.0 => Ok(0.0),
            Some(x) => Ok(x),
            None => Err(PhishGuardError::data(format!("missing label at row {i}"))),
        })
        .collect()
}

/// Builds, fits and persists the transformer
pub struct DataTransformation {
    builder: TransformerBuilder,
    target_column: String,
    production_path: PathBuf,
}

impl DataTransformation {
    pub fn new(builder: TransformerBuilder, target_column: impl Into<String>, production_path: impl Into<PathBuf>) -> Self {
        Self {
            builder,
            target_column: target_column.into(),
            production_path: production_path.into(),
        }
    }

    /// Fit on `train`, then transform both splits
    pub fn fit_transform(&self, train: &DataFrame, test: &DataFrame) -> Result<(LabeledMatrix, LabeledMatrix, FeatureTransformer)> {
        let y_train = remap_labels(train, &self.target_column)?;
        let y_test = remap_labels(test, &self.target_column)?;
        let x_train = train.drop(&self.target_column)?;
        let x_test = test.drop(&self.target_column)?;

        let mut transformer = self.builder.build();
        transformer.fit(&x_train)?;

        let mut columns = transformer.output_columns();
        columns.push(self.target_column.clone());

        let train_matrix = LabeledMatrix {
            columns: columns.clone(),
            data: append_label(transformer.transform(&x_train)?, &y_train)?,
        };
        let test_matrix = LabeledMatrix {
            columns,
            data: append_label(transformer.transform(&x_test)?, &y_test)?,
        };

        Ok((train_matrix, test_matrix, transformer))
    }

    /// Stage entry point: read validated splits, persist matrices and transformer
    pub fn run(&self, validation: &ValidationOutcome, layout: &RunLayout) -> Result<TransformationArtifact> {
        info!("starting data transformation");
        let loader = DataLoader::new();
        let train = loader.load_csv(&validation.valid_train_path)?;
        let test = loader.load_csv(&validation.valid_test_path)?;

        let (train_matrix, test_matrix, transformer) = self.fit_transform(&train, &test)?;

        let artifact = TransformationArtifact {
            transformer_path: layout.transformer_path(),
            production_transformer_path: self.production_path.clone(),
            train_matrix_path: layout.transformed_train_path(),
            test_matrix_path: layout.transformed_test_path(),
        };

        train_matrix.save(&artifact.train_matrix_path)?;
        test_matrix.save(&artifact.test_matrix_path)?;
        save_json(&artifact.transformer_path, &transformer)?;
        save_json(&artifact.production_transformer_path, &transformer)?;

        info!(
            train_shape = ?train_matrix.data.dim(),
            test_shape = ?test_matrix.data.dim(),
            transformer = %artifact.transformer_path.display(),
            "data transformation finished"
        );
        Ok(artifact)
    }
}

fn append_label(features: Array2<f64>, labels: &Array1<f64>) -> Result<Array2<f64>> {
    let label_col = labels.view().insert_axis(Axis(1));
    Ok(concatenate(Axis(1), &[features.view(), label_col])?)
}
