//! Storage backend for experiment tracking
//!
//! Runs are stored as `{base}/{experiment}/{run_id}/run.json`, with logged
//! model blobs under `{base}/{experiment}/{run_id}/artifacts/`.

use super::tracker::RunRecord;
use crate::error::{PhishGuardError, Result};
use crate::utils::{load_json, save_json, write_atomic};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage backend trait
pub trait StorageBackend: Send + Sync {
    /// Persist a run record, replacing any previous version
    fn save_run(&self, run: &RunRecord) -> Result<()>;

    /// Load a run record
    fn load_run(&self, experiment: &str, run_id: &str) -> Result<RunRecord>;

    /// Run ids of an experiment, sorted
    fn list_runs(&self, experiment: &str) -> Result<Vec<String>>;

    /// Store an opaque blob for a run, returning where it landed
    fn save_blob(&self, experiment: &str, run_id: &str, name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Local file system storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn experiment_dir(&self, experiment: &str) -> PathBuf {
        self.base_dir.join(experiment)
    }

    fn run_dir(&self, experiment: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment).join(run_id)
    }
}

/// Reject names that would escape the storage root
fn check_component(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\']);
    if bad {
        return Err(PhishGuardError::invalid_input(format!("invalid {kind} name {value:?}")));
    }
    Ok(())
}

impl StorageBackend for LocalStorage {
    fn save_run(&self, run: &RunRecord) -> Result<()> {
        check_component("experiment", &run.experiment)?;
        check_component("run", &run.run_id)?;
        save_json(&self.run_dir(&run.experiment, &run.run_id).join("run.json"), run)
    }

    fn load_run(&self, experiment: &str, run_id: &str) -> Result<RunRecord> {
        check_component("experiment", experiment)?;
        check_component("run", run_id)?;
        load_json(&self.run_dir(experiment, run_id).join("run.json"))
    }

    fn list_runs(&self, experiment: &str) -> Result<Vec<String>> {
        check_component("experiment", experiment)?;
        let dir = self.experiment_dir(experiment);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().join("run.json").is_file() {
                runs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        runs.sort();
        Ok(runs)
    }

    fn save_blob(&self, experiment: &str, run_id: &str, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        check_component("experiment", experiment)?;
        check_component("run", run_id)?;
        check_component("artifact", name)?;
        let path = self.run_dir(experiment, run_id).join("artifacts").join(name);
        write_atomic(&path, |writer| {
            writer.write_all(bytes)?;
            Ok(())
        })?;
        Ok(path)
    }
}
