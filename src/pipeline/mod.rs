//! Training pipeline orchestrator
//!
//! A linear state machine: `Ingest -> Validate -> Gate -> Transform ->
//! Train -> Done`. Any error moves the run to `Failed`, which keeps the
//! originating error. Stages run one after another on the calling thread
//! and hand off through files written under the run's [`RunLayout`].

use crate::artifacts::{IngestionArtifact, RunLayout, TrainedModelArtifact, TransformationArtifact, ValidationOutcome};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PhishGuardError, Result};
use crate::ingestion::DataIngestion;
use crate::schema::Schema;
use crate::tracking::{sink_from_config, MetricSink};
use crate::training::{ModelSelector, ModelTrainer};
use crate::transformation::{DataTransformation, TransformerBuilder};
use crate::validation::DataValidation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Ingest,
    Validate,
    Gate,
    Transform,
    Train,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the run's data comes from
#[derive(Debug, Clone)]
pub enum DataSource {
    /// A single feature export to split
    Export(PathBuf),
    /// Train and test files that are already split
    Splits { train: PathBuf, test: PathBuf },
}

/// Terminal result of a run
#[derive(Debug)]
pub enum PipelineOutcome {
    Done(TrainedModelArtifact),
    Failed {
        /// State that raised the error
        state: PipelineState,
        error: PhishGuardError,
    },
}

/// A finished run
#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: PipelineOutcome,
    /// Every state entered, in order, ending with `Done` or `Failed`
    pub history: Vec<PipelineState>,
    pub layout: RunLayout,
}

impl PipelineRun {
    pub fn state(&self) -> PipelineState {
        match self.outcome {
            PipelineOutcome::Done(_) => PipelineState::Done,
            PipelineOutcome::Failed { .. } => PipelineState::Failed,
        }
    }

    pub fn artifact(&self) -> Option<&TrainedModelArtifact> {
        match &self.outcome {
            PipelineOutcome::Done(artifact) => Some(artifact),
            PipelineOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PhishGuardError> {
        match &self.outcome {
            PipelineOutcome::Done(_) => None,
            PipelineOutcome::Failed { error, .. } => Some(error),
        }
    }

    /// Convert into a `Result`, dropping the history
    pub fn into_result(self) -> Result<TrainedModelArtifact> {
        match self.outcome {
            PipelineOutcome::Done(artifact) => Ok(artifact),
            PipelineOutcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Artifacts collected while the run advances
#[derive(Default)]
struct StageArtifacts {
    ingestion: Option<IngestionArtifact>,
    validation: Option<ValidationOutcome>,
    /// Schema feature order, fixed at validation
    feature_order: Option<Vec<String>>,
    transformation: Option<TransformationArtifact>,
    trained: Option<TrainedModelArtifact>,
}

fn missing(artifact: &str) -> PhishGuardError {
    PhishGuardError::training(format!("{artifact} artifact not available"))
}

/// The training pipeline
pub struct TrainingPipeline {
    config: PipelineConfig,
    schema: Option<Schema>,
    transformer: TransformerBuilder,
    selector: ModelSelector,
    sink: Option<Box<dyn MetricSink>>,
}

impl TrainingPipeline {
    /// Pipeline from configuration; the schema is read from `schema_path`
    pub fn new(config: PipelineConfig) -> Self {
        let transformer = TransformerBuilder::new().with_n_neighbors(config.transformation.n_neighbors);
        let selector = ModelSelector::from_config(&config.trainer);
        Self {
            config,
            schema: None,
            transformer,
            selector,
            sink: None,
        }
    }

    /// Use `schema` instead of reading the schema file
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_transformer(mut self, builder: TransformerBuilder) -> Self {
        self.transformer = builder;
        self
    }

    pub fn with_selector(mut self, selector: ModelSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run in a new timestamped directory under `artifact_dir`
    pub fn run(self, source: &DataSource) -> PipelineRun {
        let layout = RunLayout::timestamped(&self.config.artifact_dir);
        self.run_in(source, layout)
    }

    /// Run with an explicit layout
    pub fn run_in(mut self, source: &DataSource, layout: RunLayout) -> PipelineRun {
        let started = Instant::now();
        info!(root = %layout.root().display(), "training pipeline started");

        let mut state = PipelineState::Ingest;
        let mut history = vec![state];
        let mut artifacts = StageArtifacts::default();

        while !state.is_terminal() {
            match self.step(state, source, &layout, &mut artifacts) {
                Ok(next) => {
                    state = next;
                    history.push(state);
                }
                Err(error) => {
                    error!(state = %state, error = %error, "training pipeline failed");
                    history.push(PipelineState::Failed);
                    return PipelineRun {
                        outcome: PipelineOutcome::Failed { state, error },
                        history,
                        layout,
                    };
                }
            }
        }

        let outcome = match artifacts.trained.take() {
            Some(artifact) => {
                info!(
                    family = %artifact.family,
                    test_accuracy = artifact.test_accuracy,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "training pipeline finished"
                );
                PipelineOutcome::Done(artifact)
            }
            None => PipelineOutcome::Failed {
                state: PipelineState::Done,
                error: missing("trained model"),
            },
        };
        PipelineRun { outcome, history, layout }
    }

    /// Execute `state` and return the next state
    fn step(
        &mut self,
        state: PipelineState,
        source: &DataSource,
        layout: &RunLayout,
        artifacts: &mut StageArtifacts,
    ) -> Result<PipelineState> {
        match state {
            PipelineState::Ingest => {
                self.config.validate()?;
                let ingestion = match source {
                    DataSource::Export(path) => DataIngestion::new(self.config.test_ratio, self.config.trainer.random_state)
                        .with_drop_columns(self.config.drop_columns.clone())
                        .split(path, layout)?,
                    DataSource::Splits { train, test } => DataIngestion::from_existing(train, test)?,
                };
                artifacts.ingestion = Some(ingestion);
                Ok(PipelineState::Validate)
            }
            PipelineState::Validate => {
                let ingestion = artifacts.ingestion.as_ref().ok_or_else(|| missing("ingestion"))?;
                let schema = match self.schema.take() {
                    Some(schema) => schema,
                    None => Schema::load(&self.config.schema_path)?,
                };
                artifacts.feature_order = Some(schema.feature_columns(&self.config.target_column));
                let validation = DataValidation::new(schema, self.config.validation.significance)?;
                artifacts.validation = Some(validation.validate(ingestion, layout)?);
                Ok(PipelineState::Gate)
            }
            PipelineState::Gate => {
                let validation = artifacts.validation.as_ref().ok_or_else(|| missing("validation"))?;
                if !validation.status {
                    return Err(PhishGuardError::new(ErrorKind::DriftDetected {
                        columns: validation.drift_report.drifted_columns(),
                    }));
                }
                Ok(PipelineState::Transform)
            }
            PipelineState::Transform => {
                let validation = artifacts.validation.as_ref().ok_or_else(|| missing("validation"))?;
                let stage = DataTransformation::new(
                    self.transformer.clone(),
                    self.config.target_column.clone(),
                    self.config.production_preprocessor_path(),
                );
                artifacts.transformation = Some(stage.run(validation, layout)?);
                Ok(PipelineState::Train)
            }
            PipelineState::Train => {
                let transformation = artifacts.transformation.as_ref().ok_or_else(|| missing("transformation"))?;
                let sink = self
                    .sink
                    .take()
                    .unwrap_or_else(|| sink_from_config(&self.config.tracking));
                let mut trainer = ModelTrainer::new(
                    self.selector.clone(),
                    sink,
                    self.config.production_model_path(),
                    self.config.serving.phishing_class,
                );
                if let Some(order) = artifacts.feature_order.clone() {
                    trainer = trainer.with_feature_order(order);
                }
                artifacts.trained = Some(trainer.run(transformation, layout)?);
                Ok(PipelineState::Done)
            }
            PipelineState::Done | PipelineState::Failed => Ok(state),
        }
    }
}
