//! Local experiment tracker

use super::storage::{LocalStorage, StorageBackend};
use super::MetricSink;
use crate::error::{PhishGuardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Everything recorded for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Paths of stored model blobs
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

impl RunRecord {
    pub fn new(experiment: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment: experiment.into(),
            started_at: Utc::now(),
            ended_at: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }
}

/// Tracker that keeps open runs in memory and flushes them to a
/// [`StorageBackend`] after every update
pub struct LocalTracker {
    experiment: String,
    storage: Box<dyn StorageBackend>,
    runs: Mutex<BTreeMap<String, RunRecord>>,
}

impl LocalTracker {
    pub fn new(dir: impl Into<PathBuf>, experiment: impl Into<String>) -> Self {
        Self::with_storage(Box::new(LocalStorage::new(dir)), experiment)
    }

    pub fn with_storage(storage: Box<dyn StorageBackend>, experiment: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
            storage,
            runs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Stored record of a run, open or finished
    pub fn run(&self, run_id: &str) -> Result<RunRecord> {
        if let Some(run) = self.lock()?.get(run_id) {
            return Ok(run.clone());
        }
        self.storage.load_run(&self.experiment, run_id)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, RunRecord>>> {
        self.runs
            .lock()
            .map_err(|_| PhishGuardError::training("tracker state poisoned"))
    }

    fn update<F: FnOnce(&mut RunRecord)>(&self, run_id: &str, apply: F) -> Result<()> {
        let mut runs = self.lock()?;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| PhishGuardError::invalid_input(format!("no open run {run_id:?}")))?;
        apply(run);
        self.storage.save_run(run)
    }
}

impl MetricSink for LocalTracker {
    fn start_run(&self) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        let run = RunRecord::new(self.experiment.clone(), run_id.clone());
        self.storage.save_run(&run)?;
        self.lock()?.insert(run_id.clone(), run);
        debug!(experiment = %self.experiment, run_id = %run_id, "started tracking run");
        Ok(run_id)
    }

    fn log_param(&self, run_id: &str, name: &str, value: &str) -> Result<()> {
        self.update(run_id, |run| {
            run.params.insert(name.to_string(), value.to_string());
        })
    }

    fn log_metric(&self, run_id: &str, name: &str, value: f64) -> Result<()> {
        self.update(run_id, |run| {
            run.metrics.insert(name.to_string(), value);
        })
    }

    fn log_model(&self, run_id: &str, name: &str, blob: &[u8]) -> Result<()> {
        let path = self.storage.save_blob(&self.experiment, run_id, name, blob)?;
        self.update(run_id, |run| run.artifacts.push(path))
    }

    fn end_run(&self, run_id: &str) -> Result<()> {
        self.update(run_id, |run| run.ended_at = Some(Utc::now()))?;
        self.lock()?.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_lifecycle() {
        let dir = TempDir::new().unwrap();
        let tracker = LocalTracker::new(dir.path(), "phishing");

        let run_id = tracker.start_run().unwrap();
        tracker.log_param(&run_id, "family", "random_forest").unwrap();
        tracker.log_metric(&run_id, "random_forest_test_accuracy", 0.95).unwrap();
        tracker.log_model(&run_id, "model.json", b"{}").unwrap();
        tracker.end_run(&run_id).unwrap();

        let run = tracker.run(&run_id).unwrap();
        assert_eq!(run.params["family"], "random_forest");
        assert_eq!(run.metrics["random_forest_test_accuracy"], 0.95);
        assert_eq!(run.artifacts.len(), 1);
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_logging_to_unknown_run_fails() {
        let dir = TempDir::new().unwrap();
        let tracker = LocalTracker::new(dir.path(), "phishing");
        assert!(tracker.log_metric("missing", "acc", 1.0).is_err());
    }
}
