//! Integration test: label remap and KNN imputation of the continuous features

use phishguard::artifacts::{RunLayout, ValidationOutcome};
use phishguard::drift::DriftReport;
use phishguard::transformation::{DataTransformation, FeatureTransformer, LabeledMatrix, TransformerBuilder};
use phishguard::utils::{load_json, DataSaver};
use polars::prelude::*;
use tempfile::TempDir;

fn train_frame() -> DataFrame {
    df!(
        "SSLfinal_State" => &[1i64, 1, -1, -1, 1, -1, 1, -1],
        "web_traffic" => &[2i64, -1, 0, 0, 2, -1, 2, 0],
        "age_of_domain" => &[1i64, 1, -1, 0, 1, 0, 1, 0],
        "Result" => &[1i64, 1, -1, -1, 1, -1, 1, -1]
    )
    .unwrap()
}

fn test_frame() -> DataFrame {
    df!(
        "SSLfinal_State" => &[1i64, -1, 1],
        "web_traffic" => &[-1i64, 0, 2],
        "age_of_domain" => &[1i64, -1, 1],
        "Result" => &[1i64, -1, 1]
    )
    .unwrap()
}

fn stage(production: &std::path::Path) -> DataTransformation {
    DataTransformation::new(
        TransformerBuilder::new()
            .with_continuous(["web_traffic", "age_of_domain"])
            .with_n_neighbors(2),
        "Result",
        production,
    )
}

#[test]
fn test_sentinels_are_imputed_and_labels_remapped() {
    let dir = TempDir::new().unwrap();
    let (train, test, transformer) = stage(&dir.path().join("preprocessor.json"))
        .fit_transform(&train_frame(), &test_frame())
        .unwrap();

    assert_eq!(train.columns, vec!["web_traffic", "age_of_domain", "SSLfinal_State", "Result"]);
    assert_eq!(train.labels().to_vec(), vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    assert_eq!(test.labels().to_vec(), vec![1.0, 0.0, 1.0]);

    // continuous block has no sentinel and no NaN left
    for matrix in [&train, &test] {
        let features = matrix.features();
        for v in features.slice(ndarray::s![.., ..2]).iter() {
            assert!(v.is_finite());
            assert!(*v != -1.0);
        }
    }

    // categorical -1 is a real code and passes through
    assert_eq!(train.features()[[2, 2]], -1.0);
    assert_eq!(transformer.n_features(), 3);
}

#[test]
fn test_observed_values_are_untouched() {
    let dir = TempDir::new().unwrap();
    let (train, _, _) = stage(&dir.path().join("preprocessor.json"))
        .fit_transform(&train_frame(), &test_frame())
        .unwrap();

    let features = train.features();
    assert_eq!(features[[0, 0]], 2.0);
    assert_eq!(features[[2, 0]], 0.0);
    assert_eq!(features[[3, 1]], 0.0);
}

#[test]
fn test_missing_continuous_column_is_an_error() {
    let dir = TempDir::new().unwrap();
    let train = train_frame().drop("age_of_domain").unwrap();
    let test = test_frame().drop("age_of_domain").unwrap();
    assert!(stage(&dir.path().join("preprocessor.json")).fit_transform(&train, &test).is_err());
}

#[test]
fn test_run_persists_matrices_and_transformer() {
    let dir = TempDir::new().unwrap();
    let layout = RunLayout::at(dir.path().join("run"));
    let train_path = dir.path().join("train.csv");
    let test_path = dir.path().join("test.csv");
    DataSaver::save_csv(&mut train_frame(), &train_path).unwrap();
    DataSaver::save_csv(&mut test_frame(), &test_path).unwrap();

    let validation = ValidationOutcome {
        status: true,
        valid_train_path: train_path,
        valid_test_path: test_path,
        drift_report_path: dir.path().join("report.json"),
        drift_report: DriftReport::new(),
    };
    let production = dir.path().join("final_model").join("preprocessor.json");
    let artifact = stage(&production).run(&validation, &layout).unwrap();

    let train = LabeledMatrix::load(&artifact.train_matrix_path).unwrap();
    let test = LabeledMatrix::load(&artifact.test_matrix_path).unwrap();
    assert_eq!(train.data.dim(), (8, 4));
    assert_eq!(test.data.dim(), (3, 4));

    let run_copy: FeatureTransformer = load_json(&artifact.transformer_path).unwrap();
    let prod_copy: FeatureTransformer = load_json(&production).unwrap();
    assert!(run_copy.is_fitted());
    assert_eq!(run_copy.input_columns(), prod_copy.input_columns());

    // the persisted transformer reproduces the test matrix
    let rows = ndarray::array![[1.0, -1.0, 1.0], [-1.0, 0.0, -1.0], [1.0, 2.0, 1.0]];
    let replayed = prod_copy.transform_rows(&rows).unwrap();
    assert_eq!(replayed, test.features());
}
