//! Model training stage
//!
//! Reads the transformed matrices, runs model selection, reports the
//! winner to the tracking sink and writes the composite predictor to the
//! run directory and the production location.

use super::selection::{ModelSelector, SelectionOutcome};
use crate::artifacts::{RunLayout, TrainedModelArtifact, TransformationArtifact};
use crate::error::Result;
use crate::serving::PhishingModel;
use crate::tracking::{self, MetricSink, RunReport};
use crate::training::params::describe;
use crate::transformation::{FeatureTransformer, LabeledMatrix};
use crate::utils::load_json;
use std::path::PathBuf;
use tracing::info;

pub struct ModelTrainer {
    selector: ModelSelector,
    sink: Box<dyn MetricSink>,
    production_path: PathBuf,
    phishing_class: f64,
    feature_order: Option<Vec<String>>,
}

impl ModelTrainer {
    pub fn new(
        selector: ModelSelector,
        sink: Box<dyn MetricSink>,
        production_path: impl Into<PathBuf>,
        phishing_class: f64,
    ) -> Self {
        Self {
            selector,
            sink,
            production_path: production_path.into(),
            phishing_class,
            feature_order: None,
        }
    }

    /// Feature order the promoted model reads URL vectors in
    pub fn with_feature_order(mut self, order: Vec<String>) -> Self {
        self.feature_order = Some(order);
        self
    }

    fn track(&self, outcome: &SelectionOutcome, model_json: &[u8]) {
        let winner = &outcome.winner;
        let family = winner.family.name();
        let metrics = [
            ("train", &winner.train_metrics),
            ("test", &winner.test_metrics),
        ]
        .iter()
        .flat_map(|(split, m)| {
            [
                (format!("{family}_{split}_accuracy"), m.accuracy),
                (format!("{family}_{split}_precision"), m.precision),
                (format!("{family}_{split}_recall"), m.recall),
                (format!("{family}_{split}_f1_score"), m.f1_score),
            ]
        })
        .collect();

        let report = RunReport {
            params: vec![
                ("family".to_string(), family.to_string()),
                ("params".to_string(), describe(&winner.best_params)),
            ],
            metrics,
            model: Some(("model.json", model_json)),
        };
        if let Some(run_id) = tracking::report(self.sink.as_ref(), &report) {
            info!(run_id = %run_id, "tracked training run");
        }
    }

    /// Stage entry point
    pub fn run(&self, transformation: &TransformationArtifact, layout: &RunLayout) -> Result<TrainedModelArtifact> {
        info!("starting model training");
        let train = LabeledMatrix::load(&transformation.train_matrix_path)?;
        let test = LabeledMatrix::load(&transformation.test_matrix_path)?;
        let transformer: FeatureTransformer = load_json(&transformation.transformer_path)?;

        let outcome = self.selector.select(
            &train.features(),
            &train.labels(),
            &test.features(),
            &test.labels(),
        )?;

        let mut bundle = PhishingModel::new(transformer, outcome.model.clone(), self.phishing_class)?;
        if let Some(order) = &self.feature_order {
            bundle = bundle.with_feature_order(order.clone())?;
        }
        let model_json = serde_json::to_vec(&bundle)?;
        self.track(&outcome, &model_json);

        let artifact = TrainedModelArtifact {
            model_path: layout.trained_model_path(),
            production_model_path: self.production_path.clone(),
            family: outcome.winner.family,
            train_accuracy: outcome.winner.train_metrics.accuracy,
            test_accuracy: outcome.winner.test_metrics.accuracy,
            train_metrics: outcome.winner.train_metrics,
            test_metrics: outcome.winner.test_metrics,
        };
        bundle.save(&artifact.model_path)?;
        bundle.save(&artifact.production_model_path)?;

        info!(
            family = %artifact.family,
            test_accuracy = artifact.test_accuracy,
            model = %artifact.model_path.display(),
            "model training finished"
        );
        Ok(artifact)
    }
}
