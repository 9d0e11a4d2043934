//! Drift detection between two dataset splits
//!
//! Every column shared by the reference (train) and current (test) split is
//! compared with a two-sample test. A single flagged column fails the split
//! pair; there is no averaging or weighting across columns.

mod ks;
mod report;

pub use ks::{kolmogorov_survival, KolmogorovSmirnovTest, KsOutcome};
pub use report::DriftReport;

use crate::error::Result;
use crate::utils::observed_values;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Drift verdict for one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    /// True iff `p_value` is strictly below the significance level
    pub drift_flag: bool,
}

/// Trait for two-sample drift tests
pub trait DriftDetector: Send + Sync {
    /// Compare the reference and current samples of one column
    fn detect(&self, reference: &[f64], current: &[f64]) -> ColumnDrift;

    /// Significance level used for flagging
    fn significance(&self) -> f64;
}

/// Test every column of `reference` that also exists in `current`
pub fn detect_dataset_drift(
    reference: &DataFrame,
    current: &DataFrame,
    detector: &dyn DriftDetector,
) -> Result<DriftReport> {
    let mut report = DriftReport::new();

    for column in reference.get_column_names() {
        let name = column.as_str();
        if current.column(name).is_err() {
            continue;
        }
        let ref_values = observed_values(reference, name)?;
        let cur_values = observed_values(current, name)?;
        let verdict = detector.detect(&ref_values, &cur_values);
        debug!(column = name, p_value = verdict.p_value, drift = verdict.drift_flag, "ks test");
        report.insert(name, verdict);
    }

    let drifted = report.drifted_columns();
    if !drifted.is_empty() {
        warn!(columns = ?drifted, significance = detector.significance(), "data drift detected");
    }

    Ok(report)
}
