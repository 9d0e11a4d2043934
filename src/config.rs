//! Pipeline configuration
//!
//! Resolution order: defaults, then an optional TOML file, then
//! `PHISHGUARD_*` environment variables. The CLI applies its flags last.
//! The resolved configuration is validated once and never mutated mid-run.

use crate::error::{PhishGuardError, Result};
use crate::training::ModelFamily;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Label column of the phishing dataset
pub const TARGET_COLUMN: &str = "Result";

/// Drift-gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// A column drifts when its KS p-value is strictly below this
    pub significance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { significance: 0.05 }
    }
}

/// Imputer settings for the continuous columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationConfig {
    pub n_neighbors: usize,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self { n_neighbors: 3 }
    }
}

/// Model search and promotion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Minimum test accuracy for promotion
    pub expected_accuracy: f64,
    /// Maximum |train - test| accuracy difference for promotion
    pub max_accuracy_gap: f64,
    /// Folds for the grid search
    pub cv_folds: usize,
    /// Folds for sigmoid calibration
    pub calibration_folds: usize,
    /// Worker threads for the grid search (None = all cores)
    pub n_jobs: Option<usize>,
    pub random_state: u64,
    /// Families to search, in tie-break order
    pub families: Vec<ModelFamily>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            expected_accuracy: 0.6,
            max_accuracy_gap: 0.05,
            cv_folds: 5,
            calibration_folds: 3,
            n_jobs: None,
            random_state: 42,
            families: ModelFamily::all().to_vec(),
        }
    }
}

/// Prediction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    /// Encoded class that means "phishing" after the label remap
    pub phishing_class: f64,
    /// P(phishing) at or above this labels a URL as phishing
    pub classification_threshold: f64,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            phishing_class: 0.0,
            classification_threshold: 0.5,
        }
    }
}

/// Experiment tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub experiment: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("mlruns"),
            experiment: "phishguard".to_string(),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root under which each run gets a timestamped directory
    pub artifact_dir: PathBuf,
    /// Fixed production location read by the serving side
    pub final_model_dir: PathBuf,
    pub schema_path: PathBuf,
    pub target_column: String,
    /// Held-out fraction when splitting a raw feature export
    pub test_ratio: f64,
    /// Columns dropped from a raw export before splitting
    pub drop_columns: Vec<String>,
    pub validation: ValidationConfig,
    pub transformation: TransformationConfig,
    pub trainer: TrainerConfig,
    pub serving: ServingConfig,
    pub tracking: TrackingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("artifacts"),
            final_model_dir: PathBuf::from("final_model"),
            schema_path: PathBuf::from("data_schema/schema.json"),
            target_column: TARGET_COLUMN.to_string(),
            test_ratio: 0.2,
            drop_columns: Vec::new(),
            validation: ValidationConfig::default(),
            transformation: TransformationConfig::default(),
            trainer: TrainerConfig::default(),
            serving: ServingConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        info!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    /// Defaults, optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `PHISHGUARD_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("PHISHGUARD_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PHISHGUARD_FINAL_MODEL_DIR") {
            self.final_model_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("PHISHGUARD_SCHEMA_PATH") {
            self.schema_path = PathBuf::from(path);
        }
        if let Ok(n) = std::env::var("PHISHGUARD_N_JOBS") {
            let n = n.parse::<usize>().map_err(|_| {
                PhishGuardError::config(format!("PHISHGUARD_N_JOBS must be a positive integer, got {n:?}"))
            })?;
            self.trainer.n_jobs = Some(n);
        }
        if let Ok(dir) = std::env::var("PHISHGUARD_TRACKING_DIR") {
            self.tracking.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        let sig = self.validation.significance;
        if !(sig > 0.0 && sig < 1.0) {
            return Err(PhishGuardError::config(format!(
                "significance must be in (0, 1), got {sig}"
            )));
        }
        if !(0.0..=1.0).contains(&self.trainer.expected_accuracy) {
            return Err(PhishGuardError::config(format!(
                "expected_accuracy must be in [0, 1], got {}",
                self.trainer.expected_accuracy
            )));
        }
        if self.trainer.max_accuracy_gap < 0.0 {
            return Err(PhishGuardError::config("max_accuracy_gap must be non-negative"));
        }
        if self.trainer.cv_folds < 2 || self.trainer.calibration_folds < 2 {
            return Err(PhishGuardError::config(
                "cv_folds and calibration_folds must be at least 2",
            ));
        }
        if self.trainer.n_jobs == Some(0) {
            return Err(PhishGuardError::config("n_jobs must be at least 1"));
        }
        if self.trainer.families.is_empty() {
            return Err(PhishGuardError::config("at least one model family is required"));
        }
        if self.transformation.n_neighbors == 0 {
            return Err(PhishGuardError::config("n_neighbors must be at least 1"));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(PhishGuardError::config(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.serving.phishing_class != 0.0 && self.serving.phishing_class != 1.0 {
            return Err(PhishGuardError::config("phishing_class must be 0 or 1"));
        }
        Ok(())
    }

    /// Production transformer location
    pub fn production_preprocessor_path(&self) -> PathBuf {
        self.final_model_dir.join("preprocessor.json")
    }

    /// Production composite model location
    pub fn production_model_path(&self) -> PathBuf {
        self.final_model_dir.join("model.json")
    }
}
