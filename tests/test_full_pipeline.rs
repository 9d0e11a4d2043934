//! Integration test: Full pipeline (ingest → validate → gate → transform → train)

use phishguard::config::PipelineConfig;
use phishguard::error::ErrorKind;
use phishguard::pipeline::{DataSource, PipelineOutcome, PipelineRun, PipelineState, TrainingPipeline};
use phishguard::schema::Schema;
use phishguard::serving::{PhishingModel, PrecomputedFeatures, Verdict};
use phishguard::tracking::{LocalStorage, NullSink, StorageBackend};
use phishguard::training::{CandidateModel, ModelFamily, ModelSelector, ParamGrid, ParamValue, PromotionGates};
use phishguard::transformation::TransformerBuilder;
use phishguard::utils::{DataLoader, DataSaver};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const COLUMNS: [&str; 5] = ["SSLfinal_State", "URL_of_Anchor", "Prefix_Suffix", "web_traffic", "Result"];

/// `Result` mirrors `SSLfinal_State`; `web_traffic` carries `-1` sentinels
fn dataset(n: usize) -> DataFrame {
    let ssl: Vec<i64> = (0..n).map(|i| if i % 2 == 0 { 1 } else { -1 }).collect();
    let anchor: Vec<i64> = (0..n).map(|i| ((i / 2) % 3) as i64 - 1).collect();
    let prefix: Vec<i64> = (0..n).map(|i| if (i / 3) % 2 == 0 { 1 } else { -1 }).collect();
    let traffic: Vec<i64> = (0..n).map(|i| if i % 7 == 0 { -1 } else { ((i / 4) % 3) as i64 }).collect();
    df!(
        COLUMNS[0] => &ssl,
        COLUMNS[1] => &anchor,
        COLUMNS[2] => &prefix,
        COLUMNS[3] => &traffic,
        COLUMNS[4] => &ssl
    )
    .unwrap()
}

/// Same features as [`dataset`]; `Result` is flipped on every third row.
/// Label balance is unchanged, so the split passes the drift gate.
fn noisy_dataset(n: usize) -> DataFrame {
    let flipped: Vec<i64> = (0..n)
        .map(|i| {
            let ssl = if i % 2 == 0 { 1 } else { -1 };
            if i % 3 == 0 { -ssl } else { ssl }
        })
        .collect();
    let mut df = dataset(n);
    df.with_column(Column::new("Result".into(), flipped)).unwrap();
    df
}

fn write_csv(dir: &Path, name: &str, mut df: DataFrame) -> PathBuf {
    let path = dir.join(name);
    DataSaver::save_csv(&mut df, &path).unwrap();
    path
}

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.artifact_dir = root.join("artifacts");
    config.final_model_dir = root.join("final_model");
    config.schema_path = root.join("schema.json");
    config.tracking.enabled = false;
    config.trainer.n_jobs = Some(2);
    config
}

fn selector(max_accuracy_gap: f64) -> ModelSelector {
    gated_selector(0.6, max_accuracy_gap)
}

fn gated_selector(expected_accuracy: f64, max_accuracy_gap: f64) -> ModelSelector {
    let mut lr = ParamGrid::new();
    lr.insert("C".into(), vec![ParamValue::Float(1.0)]);
    let mut dt = ParamGrid::new();
    dt.insert("max_depth".into(), vec![ParamValue::Int(3)]);
    ModelSelector::new(
        vec![
            CandidateModel::new(ModelFamily::LogisticRegression, lr),
            CandidateModel::new(ModelFamily::DecisionTree, dt),
        ],
        PromotionGates {
            expected_accuracy,
            max_accuracy_gap,
        },
    )
    .with_n_jobs(Some(2))
}

fn pipeline(config: PipelineConfig) -> TrainingPipeline {
    TrainingPipeline::new(config)
        .with_schema(Schema::from_columns(COLUMNS.iter().map(|c| (*c, "int64"))))
        .with_transformer(
            TransformerBuilder::new()
                .with_continuous(["web_traffic"])
                .with_n_neighbors(3),
        )
        .with_selector(selector(0.2))
        .with_sink(Box::new(NullSink))
}

#[test]
fn test_pipeline_reaches_done() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", dataset(120));
    let test = write_csv(dir.path(), "test.csv", dataset(60));
    let config = config(dir.path());
    let production = config.production_model_path();

    let run = pipeline(config).run(&DataSource::Splits { train, test });

    assert_eq!(run.state(), PipelineState::Done, "error: {:?}", run.error());
    assert_eq!(
        run.history,
        vec![
            PipelineState::Ingest,
            PipelineState::Validate,
            PipelineState::Gate,
            PipelineState::Transform,
            PipelineState::Train,
            PipelineState::Done,
        ]
    );

    let artifact = run.artifact().unwrap();
    assert!(artifact.test_accuracy >= 0.6);
    assert!((artifact.train_accuracy - artifact.test_accuracy).abs() <= 0.2);
    assert!(artifact.model_path.exists());
    assert_eq!(artifact.production_model_path, production);
    assert!(production.exists());
    assert!(dir.path().join("final_model").join("preprocessor.json").exists());

    // the promoted bundle labels the raw test rows
    let model = PhishingModel::load(&production).unwrap();
    let frame = DataLoader::new().load_csv(&dir.path().join("test.csv")).unwrap();
    let predictions = model.predict_frame(&frame.drop("Result").unwrap()).unwrap();
    let expected: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
    let correct = predictions.iter().zip(&expected).filter(|(p, e)| p == e).count();
    assert!(correct as f64 / 60.0 >= 0.6);
}

#[test]
fn test_drift_stops_at_gate() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", dataset(120));

    let mut shifted = dataset(60);
    let far: Vec<i64> = (0..60).map(|i| 50 + i as i64).collect();
    shifted.with_column(Column::new("web_traffic".into(), far)).unwrap();
    let test = write_csv(dir.path(), "test.csv", shifted);

    let config = config(dir.path());
    let production = config.production_model_path();
    let run = pipeline(config).run(&DataSource::Splits { train, test });

    assert_eq!(run.state(), PipelineState::Failed);
    assert_eq!(run.history.last(), Some(&PipelineState::Failed));
    assert_eq!(run.history[run.history.len() - 2], PipelineState::Gate);
    match run.error().map(|e| e.kind()) {
        Some(ErrorKind::DriftDetected { columns }) => {
            assert_eq!(columns, &vec!["web_traffic".to_string()]);
        }
        other => panic!("expected drift, got {other:?}"),
    }
    assert!(!production.exists());
    assert!(!dir.path().join("final_model").join("preprocessor.json").exists());
}

#[test]
fn test_schema_mismatch_fails_validation() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", dataset(60));
    let test = write_csv(dir.path(), "test.csv", dataset(30).drop("Prefix_Suffix").unwrap());

    let run = pipeline(config(dir.path())).run(&DataSource::Splits { train, test });

    assert_eq!(run.state(), PipelineState::Failed);
    assert_eq!(
        run.history,
        vec![PipelineState::Ingest, PipelineState::Validate, PipelineState::Failed]
    );
    assert!(matches!(run.error().unwrap().kind(), ErrorKind::SchemaMismatch { .. }));
}

#[test]
fn test_missing_input_fails_ingestion() {
    let dir = TempDir::new().unwrap();
    let run = pipeline(config(dir.path())).run(&DataSource::Export(dir.path().join("absent.csv")));

    assert_eq!(run.history, vec![PipelineState::Ingest, PipelineState::Failed]);
    assert!(run.into_result().is_err());
}

#[test]
fn test_export_source_with_tracking() {
    let dir = TempDir::new().unwrap();
    let export = write_csv(dir.path(), "phishing.csv", dataset(160));

    let mut config = config(dir.path());
    config.validation.significance = 1e-9;
    config.test_ratio = 0.25;
    config.tracking.enabled = true;
    config.tracking.dir = dir.path().join("mlruns");
    config.tracking.experiment = "integration".to_string();

    // no explicit sink: the configured local tracker is used
    let run = TrainingPipeline::new(config)
        .with_schema(Schema::from_columns(COLUMNS.iter().map(|c| (*c, "int64"))))
        .with_transformer(TransformerBuilder::new().with_continuous(["web_traffic"]))
        .with_selector(selector(0.2))
        .run(&DataSource::Export(export));

    assert_eq!(run.state(), PipelineState::Done, "error: {:?}", run.error());
    assert!(run.layout.feature_store_path().exists());
    assert!(run.layout.drift_report_path().exists());

    let storage = LocalStorage::new(dir.path().join("mlruns"));
    let runs = storage.list_runs("integration").unwrap();
    assert_eq!(runs.len(), 1);

    let record = storage.load_run("integration", &runs[0]).unwrap();
    let family = run.artifact().unwrap().family.name();
    assert!(record.metrics.contains_key(&format!("{family}_test_accuracy")));
    assert!(record.metrics.contains_key(&format!("{family}_train_f1_score")));
    assert!(record.ended_at.is_some());
}

#[test]
fn test_promoted_model_scores_urls() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", dataset(120));
    let test = write_csv(dir.path(), "test.csv", dataset(60));
    let mut config = config(dir.path());
    config.serving.phishing_class = 0.0;
    let production = config.production_model_path();

    pipeline(config)
        .run(&DataSource::Splits { train, test })
        .into_result()
        .unwrap();

    // schema order: SSLfinal_State, URL_of_Anchor, Prefix_Suffix, web_traffic
    let mut table = HashMap::new();
    table.insert("http://secure.example".to_string(), vec![1.0, 0.0, 1.0, 1.0]);
    table.insert("http://login-verify.example".to_string(), vec![-1.0, 0.0, 1.0, -1.0]);
    let extractor = PrecomputedFeatures::new(table);

    let model = PhishingModel::load(&production).unwrap();
    let predictions = model
        .predict_urls(&extractor, "http://secure.example, http://login-verify.example", 0.5)
        .unwrap();

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].label, Verdict::Legitimate);
    assert_eq!(predictions[1].label, Verdict::Phishing);
}

/// Clean training split, test split with a third of its labels flipped:
/// train accuracy is 1.0 and test accuracy 2/3
fn run_with_gates(dir: &Path, expected_accuracy: f64, max_accuracy_gap: f64) -> (PipelineRun, PipelineConfig) {
    let train = write_csv(dir, "train.csv", dataset(120));
    let test = write_csv(dir, "test.csv", noisy_dataset(60));
    let config = config(dir);
    let run = pipeline(config.clone())
        .with_selector(gated_selector(expected_accuracy, max_accuracy_gap))
        .run(&DataSource::Splits { train, test });
    (run, config)
}

fn assert_rejected_at_train(run: &PipelineRun, config: &PipelineConfig) {
    assert_eq!(run.state(), PipelineState::Failed);
    assert_eq!(
        run.history,
        vec![
            PipelineState::Ingest,
            PipelineState::Validate,
            PipelineState::Gate,
            PipelineState::Transform,
            PipelineState::Train,
            PipelineState::Failed,
        ]
    );
    assert!(run.error().unwrap().is_quality_gate());
    assert!(!run.layout.trained_model_path().exists());
    assert!(!config.production_model_path().exists());
}

#[test]
fn test_unreachable_accuracy_fails_training() {
    let dir = TempDir::new().unwrap();
    let (run, config) = run_with_gates(dir.path(), 0.9, 1.0);

    assert_rejected_at_train(&run, &config);
    match run.error().map(|e| e.kind()) {
        Some(ErrorKind::AccuracyBelowExpected { test_accuracy, expected, .. }) => {
            assert_eq!(*expected, 0.9);
            assert!(*test_accuracy < 0.9);
        }
        other => panic!("expected accuracy gate, got {other:?}"),
    }
}

#[test]
fn test_overfit_winner_fails_gap_gate() {
    let dir = TempDir::new().unwrap();
    let (run, config) = run_with_gates(dir.path(), 0.6, 0.2);

    assert_rejected_at_train(&run, &config);
    match run.error().map(|e| e.kind()) {
        Some(ErrorKind::GeneralizationGap { gap, max_gap, .. }) => {
            assert_eq!(*max_gap, 0.2);
            assert!(*gap > 0.2);
        }
        other => panic!("expected gap gate, got {other:?}"),
    }
}

#[test]
fn test_invalid_config_fails_at_ingest() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", dataset(60));
    let test = write_csv(dir.path(), "test.csv", dataset(30));
    let mut config = config(dir.path());
    config.test_ratio = 1.5;

    let run = pipeline(config).run(&DataSource::Splits { train, test });

    assert_eq!(run.history, vec![PipelineState::Ingest, PipelineState::Failed]);
    match run.outcome {
        PipelineOutcome::Failed { state, ref error } => {
            assert_eq!(state, PipelineState::Ingest);
            assert!(matches!(error.kind(), ErrorKind::Config(_)));
        }
        PipelineOutcome::Done(_) => panic!("invalid config must not train"),
    }
    assert!(!run.layout.feature_store_path().exists());
}

#[test]
fn test_url_vectors_use_schema_order() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", dataset(120));
    let test = write_csv(dir.path(), "test.csv", dataset(60));
    let config = config(dir.path());
    let production = config.production_model_path();

    // declared order is the reverse of the CSV column order
    let declared = ["web_traffic", "Prefix_Suffix", "URL_of_Anchor", "SSLfinal_State", "Result"];
    pipeline(config)
        .with_schema(Schema::from_columns(declared.iter().map(|c| (*c, "int64"))))
        .run(&DataSource::Splits { train, test })
        .into_result()
        .unwrap();

    let model = PhishingModel::load(&production).unwrap();
    assert_eq!(model.feature_order(), &declared[..4]);

    let mut table = HashMap::new();
    table.insert("http://secure.example".to_string(), vec![1.0, 1.0, 0.0, 1.0]);
    table.insert("http://login-verify.example".to_string(), vec![1.0, 1.0, 0.0, -1.0]);
    let extractor = PrecomputedFeatures::new(table);

    let predictions = model
        .predict_urls(&extractor, "http://secure.example\nhttp://login-verify.example", 0.5)
        .unwrap();
    assert_eq!(predictions[0].label, Verdict::Legitimate);
    assert_eq!(predictions[1].label, Verdict::Phishing);
}
