//! PhishGuard - Phishing URL classifier training pipeline
//!
//! This crate trains and serves a binary classifier over pre-extracted URL
//! features:
//! - Schema conformance and Kolmogorov-Smirnov drift gating
//! - KNN imputation of the continuous features
//! - Grid-searched model families with sigmoid calibration
//! - Promotion gates on test accuracy and the train/test gap
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`ingestion`] - Splitting a feature export into train and test
//! - [`validation`] - Schema and drift checks
//! - [`transformation`] - Label remap and feature imputation
//! - [`training`] - Model families, grid search and selection
//! - [`pipeline`] - The orchestrator state machine
//!
//! ## Building blocks
//! - [`schema`] - Required columns of a split
//! - [`drift`] - Two-sample drift tests
//! - [`imputation`] - KNN imputer
//! - [`calibration`] - Platt scaling and cross-validated calibration
//! - [`tracking`] - Experiment tracking
//!
//! ## Services
//! - [`serving`] - Prediction with the promoted model
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;
pub mod artifacts;

// Pipeline stages
pub mod ingestion;
pub mod validation;
pub mod transformation;
pub mod training;
pub mod pipeline;

// Building blocks
pub mod schema;
pub mod drift;
pub mod imputation;
pub mod calibration;
pub mod tracking;
pub mod utils;

// Services
pub mod serving;
pub mod cli;

pub use error::{ErrorKind, PhishGuardError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ErrorKind, PhishGuardError, Result};
    pub use crate::config::PipelineConfig;
    pub use crate::artifacts::{RunLayout, TrainedModelArtifact};

    // Orchestration
    pub use crate::pipeline::{DataSource, PipelineOutcome, PipelineRun, PipelineState, TrainingPipeline};

    // Data checks
    pub use crate::schema::Schema;
    pub use crate::drift::{DriftDetector, DriftReport, KolmogorovSmirnovTest};

    // Transformation
    pub use crate::transformation::{FeatureTransformer, TransformerBuilder};
    pub use crate::imputation::KNNImputer;

    // Training
    pub use crate::training::{
        CandidateModel, ClassificationMetrics, Classifier, Estimator, ModelFamily, ModelSelector, PromotionGates,
    };
    pub use crate::calibration::{CalibratedClassifier, PlattScaling};

    // Tracking
    pub use crate::tracking::{LocalTracker, MetricSink, NullSink};

    // Serving
    pub use crate::serving::{FeatureExtractor, PhishingModel, Prediction, PrecomputedFeatures, Verdict};
}
