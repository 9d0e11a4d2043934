//! Data ingestion from a local feature export
//!
//! The export is copied into the run's feature store, optionally stripped
//! of unwanted columns, shuffled with a seeded RNG and split into train and
//! test files.

use crate::artifacts::{DatasetSplit, IngestionArtifact, RunLayout};
use crate::error::{PhishGuardError, Result};
use crate::utils::{DataLoader, DataSaver};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use tracing::info;

/// Splits a raw feature table into train/test files
#[derive(Debug, Clone)]
pub struct DataIngestion {
    test_ratio: f64,
    seed: u64,
    drop_columns: Vec<String>,
}

impl DataIngestion {
    pub fn new(test_ratio: f64, seed: u64) -> Self {
        Self {
            test_ratio,
            seed,
            drop_columns: Vec::new(),
        }
    }

    /// Columns removed before splitting (e.g. a document-store `_id`)
    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    /// Read `raw_csv`, split it and write the splits under `layout`
    pub fn split(&self, raw_csv: &Path, layout: &RunLayout) -> Result<IngestionArtifact> {
        let mut df = DataLoader::new().load_csv(raw_csv)?;

        for column in &self.drop_columns {
            if df.column(column).is_ok() {
                df = df.drop(column)?;
            }
        }

        let n = df.height();
        if n < 2 {
            return Err(PhishGuardError::data(format!(
                "need at least 2 rows to split, {} has {n}",
                raw_csv.display()
            )));
        }

        let mut feature_store = df.clone();
        DataSaver::save_csv(&mut feature_store, &layout.feature_store_path())?;

        let n_test = ((n as f64) * self.test_ratio).ceil() as usize;
        let n_test = n_test.clamp(1, n - 1);

        let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        let mut train = df.take(&IdxCa::from_vec("idx".into(), train_idx.to_vec()))?;
        let mut test = df.take(&IdxCa::from_vec("idx".into(), test_idx.to_vec()))?;

        let train_path = layout.ingested_train_path();
        let test_path = layout.ingested_test_path();
        DataSaver::save_csv(&mut train, &train_path)?;
        DataSaver::save_csv(&mut test, &test_path)?;

        info!(
            source = %raw_csv.display(),
            train_rows = train.height(),
            test_rows = test.height(),
            "ingested feature export"
        );

        Ok(IngestionArtifact {
            train: DatasetSplit::from_frame(train_path, &train),
            test: DatasetSplit::from_frame(test_path, &test),
        })
    }

    /// Wrap pre-split files as an ingestion artifact
    pub fn from_existing(train_csv: &Path, test_csv: &Path) -> Result<IngestionArtifact> {
        let loader = DataLoader::new();
        let train = loader.load_csv(train_csv)?;
        let test = loader.load_csv(test_csv)?;
        Ok(IngestionArtifact {
            train: DatasetSplit::from_frame(train_csv, &train),
            test: DatasetSplit::from_frame(test_csv, &test),
        })
    }
}
