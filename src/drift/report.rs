//! Per-column drift report

use crate::drift::ColumnDrift;
use crate::error::Result;
use crate::utils::{load_json, save_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Column name to `{p_value, drift_flag}`, serialized as a flat JSON object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriftReport {
    columns: BTreeMap<String, ColumnDrift>,
}

impl DriftReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, drift: ColumnDrift) {
        self.columns.insert(column.into(), drift);
    }

    pub fn get(&self, column: &str) -> Option<&ColumnDrift> {
        self.columns.get(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ColumnDrift)> {
        self.columns.iter()
    }

    /// Names of flagged columns, sorted
    pub fn drifted_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, d)| d.drift_flag)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// True only when no column is flagged
    pub fn status(&self) -> bool {
        self.columns.values().all(|d| !d.drift_flag)
    }

    /// Replace the report file at `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_and_of_unflagged() {
        let mut report = DriftReport::new();
        assert!(report.status(), "empty report carries no drift");

        report.insert("a", ColumnDrift { p_value: 0.9, drift_flag: false });
        assert!(report.status());

        report.insert("b", ColumnDrift { p_value: 0.01, drift_flag: true });
        assert!(!report.status());
        assert_eq!(report.drifted_columns(), vec!["b".to_string()]);
    }

    #[test]
    fn test_file_format_is_flat_mapping() {
        let mut report = DriftReport::new();
        report.insert("web_traffic", ColumnDrift { p_value: 0.5, drift_flag: false });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drift_report").join("report.json");
        report.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["web_traffic"]["p_value"], 0.5);
        assert_eq!(raw["web_traffic"]["drift_flag"], false);

        assert_eq!(DriftReport::load(&path).unwrap(), report);
    }
}
