//! Experiment tracking
//!
//! Metrics and model blobs go to a [`MetricSink`]. Tracking is best effort:
//! [`report`] logs sink failures and never returns them.

mod storage;
mod tracker;

pub use storage::{LocalStorage, StorageBackend};
pub use tracker::{LocalTracker, RunRecord};

use crate::config::TrackingConfig;
use crate::error::Result;
use tracing::warn;

/// Destination for run metrics
pub trait MetricSink: Send + Sync {
    /// Open a run and return its id
    fn start_run(&self) -> Result<String>;

    fn log_param(&self, run_id: &str, name: &str, value: &str) -> Result<()>;

    fn log_metric(&self, run_id: &str, name: &str, value: f64) -> Result<()>;

    /// Store an opaque model blob with the run
    fn log_model(&self, run_id: &str, name: &str, blob: &[u8]) -> Result<()>;

    fn end_run(&self, run_id: &str) -> Result<()>;
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn start_run(&self) -> Result<String> {
        Ok(String::new())
    }

    fn log_param(&self, _run_id: &str, _name: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn log_metric(&self, _run_id: &str, _name: &str, _value: f64) -> Result<()> {
        Ok(())
    }

    fn log_model(&self, _run_id: &str, _name: &str, _blob: &[u8]) -> Result<()> {
        Ok(())
    }

    fn end_run(&self, _run_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Sink selected by configuration
pub fn sink_from_config(config: &TrackingConfig) -> Box<dyn MetricSink> {
    if config.enabled {
        Box::new(LocalTracker::new(config.dir.clone(), config.experiment.clone()))
    } else {
        Box::new(NullSink)
    }
}

/// What a training run reports to the sink
#[derive(Debug, Clone, Default)]
pub struct RunReport<'a> {
    pub params: Vec<(String, String)>,
    pub metrics: Vec<(String, f64)>,
    pub model: Option<(&'a str, &'a [u8])>,
}

/// Send `report` to `sink` in one run; failures are logged, not returned
pub fn report(sink: &dyn MetricSink, report: &RunReport<'_>) -> Option<String> {
    let outcome = (|| -> Result<String> {
        let run_id = sink.start_run()?;
        for (name, value) in &report.params {
            sink.log_param(&run_id, name, value)?;
        }
        for (name, value) in &report.metrics {
            sink.log_metric(&run_id, name, *value)?;
        }
        if let Some((name, blob)) = report.model {
            sink.log_model(&run_id, name, blob)?;
        }
        sink.end_run(&run_id)?;
        Ok(run_id)
    })();

    match outcome {
        Ok(run_id) => Some(run_id),
        Err(e) => {
            warn!(error = %e, "experiment tracking failed, continuing without it");
            None
        }
    }
}
