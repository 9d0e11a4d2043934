//! Integration test: schema conformance and drift gating

use phishguard::artifacts::RunLayout;
use phishguard::drift::DriftReport;
use phishguard::error::ErrorKind;
use phishguard::ingestion::DataIngestion;
use phishguard::schema::Schema;
use phishguard::utils::DataSaver;
use phishguard::validation::DataValidation;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn schema() -> Schema {
    Schema::from_columns([
        ("having_IP_Address", "int64"),
        ("URL_Length", "int64"),
        ("web_traffic", "int64"),
        ("Result", "int64"),
    ])
}

fn split_frame(n: usize, offset: i64) -> DataFrame {
    let ip: Vec<i64> = (0..n).map(|i| if i % 3 == 0 { -1 } else { 1 }).collect();
    let length: Vec<i64> = (0..n).map(|i| (i % 3) as i64 - 1).collect();
    let traffic: Vec<i64> = (0..n).map(|i| (i % 20) as i64 + offset).collect();
    let label: Vec<i64> = (0..n).map(|i| if i % 2 == 0 { 1 } else { -1 }).collect();
    df!(
        "having_IP_Address" => &ip,
        "URL_Length" => &length,
        "web_traffic" => &traffic,
        "Result" => &label
    )
    .unwrap()
}

fn write_csv(dir: &Path, name: &str, mut df: DataFrame) -> PathBuf {
    let path = dir.join(name);
    DataSaver::save_csv(&mut df, &path).unwrap();
    path
}

#[test]
fn test_identical_splits_pass() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", split_frame(80, 0));
    let test = write_csv(dir.path(), "test.csv", split_frame(40, 0));
    let layout = RunLayout::at(dir.path().join("run"));

    let ingestion = DataIngestion::from_existing(&train, &test).unwrap();
    let outcome = DataValidation::new(schema(), 0.05)
        .unwrap()
        .validate(&ingestion, &layout)
        .unwrap();

    assert!(outcome.status);
    assert_eq!(outcome.drift_report.len(), 4);
    assert!(outcome.drift_report.drifted_columns().is_empty());
    assert!(outcome.valid_train_path.exists());
    assert!(outcome.valid_test_path.exists());

    let persisted = DriftReport::load(&outcome.drift_report_path).unwrap();
    assert_eq!(persisted, outcome.drift_report);
}

#[test]
fn test_shifted_column_is_flagged() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", split_frame(80, 0));
    let test = write_csv(dir.path(), "test.csv", split_frame(80, 100));
    let layout = RunLayout::at(dir.path().join("run"));

    let ingestion = DataIngestion::from_existing(&train, &test).unwrap();
    let outcome = DataValidation::new(schema(), 0.05)
        .unwrap()
        .validate(&ingestion, &layout)
        .unwrap();

    assert!(!outcome.status);
    assert_eq!(outcome.drift_report.drifted_columns(), vec!["web_traffic".to_string()]);

    let traffic = outcome.drift_report.get("web_traffic").unwrap();
    assert!(traffic.p_value < 0.05);
    let ip = outcome.drift_report.get("having_IP_Address").unwrap();
    assert!(!ip.drift_flag);
}

#[test]
fn test_missing_column_stops_before_drift() {
    let dir = TempDir::new().unwrap();
    let train = write_csv(dir.path(), "train.csv", split_frame(40, 0));
    let test = write_csv(dir.path(), "test.csv", split_frame(40, 0).drop("URL_Length").unwrap());
    let layout = RunLayout::at(dir.path().join("run"));

    let ingestion = DataIngestion::from_existing(&train, &test).unwrap();
    let err = DataValidation::new(schema(), 0.05)
        .unwrap()
        .validate(&ingestion, &layout)
        .unwrap_err();

    match err.kind() {
        ErrorKind::SchemaMismatch { missing, extra } => {
            assert_eq!(missing, &vec!["URL_Length".to_string()]);
            assert!(extra.is_empty());
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
    assert!(!layout.drift_report_path().exists());
}

#[test]
fn test_extra_column_is_a_mismatch() {
    let dir = TempDir::new().unwrap();
    let mut wide = split_frame(40, 0);
    wide.with_column(Column::new("_id".into(), (0..40i64).collect::<Vec<_>>())).unwrap();
    let train = write_csv(dir.path(), "train.csv", wide);
    let test = write_csv(dir.path(), "test.csv", split_frame(40, 0));

    let ingestion = DataIngestion::from_existing(&train, &test).unwrap();
    let err = DataValidation::new(schema(), 0.05)
        .unwrap()
        .validate(&ingestion, &RunLayout::at(dir.path().join("run")))
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::SchemaMismatch { .. }));
}

#[test]
fn test_significance_must_be_a_probability() {
    assert!(DataValidation::new(schema(), 0.0).is_err());
    assert!(DataValidation::new(schema(), 1.5).is_err());
}

#[test]
fn test_export_split_drops_columns() {
    let dir = TempDir::new().unwrap();
    let mut export = split_frame(50, 0);
    export.with_column(Column::new("_id".into(), (0..50i64).collect::<Vec<_>>())).unwrap();
    let path = write_csv(dir.path(), "export.csv", export);
    let layout = RunLayout::at(dir.path().join("run"));

    let ingestion = DataIngestion::new(0.2, 7)
        .with_drop_columns(vec!["_id".to_string()])
        .split(&path, &layout)
        .unwrap();

    assert_eq!(ingestion.train.n_rows + ingestion.test.n_rows, 50);
    assert_eq!(ingestion.test.n_rows, 10);
    assert!(layout.feature_store_path().exists());

    let outcome = DataValidation::new(schema(), 1e-6)
        .unwrap()
        .validate(&ingestion, &layout)
        .unwrap();
    assert_eq!(outcome.drift_report.len(), 4);
}
