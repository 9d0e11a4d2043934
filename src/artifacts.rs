//! Artifacts handed from one pipeline stage to the next
//!
//! Each stage consumes only its predecessor's artifact and returns a new
//! one. Artifacts are plain data; the files they point at are written
//! atomically before the artifact is returned.

use crate::drift::DriftReport;
use crate::error::{PhishGuardError, Result};
use crate::training::{ClassificationMetrics, ModelFamily};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable reference to a tabular file and its shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub path: PathBuf,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl DatasetSplit {
    pub fn from_frame(path: impl Into<PathBuf>, df: &DataFrame) -> Self {
        Self {
            path: path.into(),
            n_rows: df.height(),
            n_cols: df.width(),
        }
    }
}

/// Train and test splits produced by ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub train: DatasetSplit,
    pub test: DatasetSplit,
}

impl IngestionArtifact {
    /// Fail unless both split files exist
    pub fn ensure_exists(&self) -> Result<()> {
        for split in [&self.train, &self.test] {
            if !split.path.is_file() {
                return Err(PhishGuardError::from(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("ingested split missing: {}", split.path.display()),
                )));
            }
        }
        Ok(())
    }
}

/// Result of the schema and drift checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// True only when no column drifted
    pub status: bool,
    pub valid_train_path: PathBuf,
    pub valid_test_path: PathBuf,
    pub drift_report_path: PathBuf,
    pub drift_report: DriftReport,
}

/// Transformed matrices and the fitted transformer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationArtifact {
    pub transformer_path: PathBuf,
    pub production_transformer_path: PathBuf,
    /// Features with the label as the last column
    pub train_matrix_path: PathBuf,
    pub test_matrix_path: PathBuf,
}

/// The promoted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelArtifact {
    pub model_path: PathBuf,
    pub production_model_path: PathBuf,
    pub family: ModelFamily,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
}

/// Per-run directory layout under the artifact root
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// `<artifact_dir>/<timestamp>_<short id>`
    pub fn timestamped(artifact_dir: &Path) -> Self {
        let stamp = chrono::Local::now().format("%m_%d_%Y_%H_%M_%S");
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            root: artifact_dir.join(format!("{stamp}_{}", &id[..8])),
        }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn feature_store_path(&self) -> PathBuf {
        self.root.join("data_ingestion").join("feature_store").join("phishing.csv")
    }

    pub fn ingested_train_path(&self) -> PathBuf {
        self.root.join("data_ingestion").join("ingested").join("train.csv")
    }

    pub fn ingested_test_path(&self) -> PathBuf {
        self.root.join("data_ingestion").join("ingested").join("test.csv")
    }

    pub fn valid_train_path(&self) -> PathBuf {
        self.root.join("data_validation").join("validated").join("train.csv")
    }

    pub fn valid_test_path(&self) -> PathBuf {
        self.root.join("data_validation").join("validated").join("test.csv")
    }

    pub fn drift_report_path(&self) -> PathBuf {
        self.root.join("data_validation").join("drift_report").join("report.json")
    }

    pub fn transformer_path(&self) -> PathBuf {
        self.root
            .join("data_transformation")
            .join("transformed_object")
            .join("preprocessing.json")
    }

    pub fn transformed_train_path(&self) -> PathBuf {
        self.root.join("data_transformation").join("transformed").join("train.json")
    }

    pub fn transformed_test_path(&self) -> PathBuf {
        self.root.join("data_transformation").join("transformed").join("test.json")
    }

    pub fn trained_model_path(&self) -> PathBuf {
        self.root.join("model_trainer").join("trained_model").join("model.json")
    }
}
