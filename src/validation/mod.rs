//! Schema and drift validation stage

use crate::artifacts::{IngestionArtifact, RunLayout, ValidationOutcome};
use crate::drift::{detect_dataset_drift, DriftDetector, KolmogorovSmirnovTest};
use crate::error::Result;
use crate::schema::Schema;
use crate::utils::{copy_atomic, DataLoader};
use tracing::info;

/// Checks column conformance and distribution shift between two splits
pub struct DataValidation {
    schema: Schema,
    detector: Box<dyn DriftDetector>,
}

impl DataValidation {
    /// Validation with a KS test at `significance`
    pub fn new(schema: Schema, significance: f64) -> Result<Self> {
        Ok(Self {
            schema,
            detector: Box::new(KolmogorovSmirnovTest::new(significance)?),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run the checks and persist the drift report
    ///
    /// Schema mismatches are fatal and stop before the drift test. Drift
    /// itself is not an error here: it is reported through `status` and the
    /// orchestrator's gate decides.
    pub fn validate(&self, ingestion: &IngestionArtifact, layout: &RunLayout) -> Result<ValidationOutcome> {
        ingestion.ensure_exists()?;

        let loader = DataLoader::new();
        let train = loader.load_csv(&ingestion.train.path)?;
        let test = loader.load_csv(&ingestion.test.path)?;

        self.schema.require_columns(&train, "train")?;
        self.schema.require_columns(&test, "test")?;
        info!(columns = self.schema.len(), "schema validation passed");

        let report = detect_dataset_drift(&train, &test, self.detector.as_ref())?;
        let drift_report_path = layout.drift_report_path();
        report.save(&drift_report_path)?;

        let valid_train_path = layout.valid_train_path();
        let valid_test_path = layout.valid_test_path();
        copy_atomic(&ingestion.train.path, &valid_train_path)?;
        copy_atomic(&ingestion.test.path, &valid_test_path)?;

        let status = report.status();
        info!(
            status,
            drifted = report.drifted_columns().len(),
            report = %drift_report_path.display(),
            "data validation finished"
        );

        Ok(ValidationOutcome {
            status,
            valid_train_path,
            valid_test_path,
            drift_report_path,
            drift_report: report,
        })
    }
}
