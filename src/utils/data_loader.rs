//! Tabular data loading and conversion
//!
//! Frames are read with polars. Numeric matrices carry missing cells as
//! `NaN`; in a frame missingness is an explicit null.

use crate::error::{PhishGuardError, Result};
use crate::utils::persist::write_atomic;
use ndarray::Array2;
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// CSV loader
pub struct DataLoader {
    /// Rows sampled to infer column types
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(1000),
        }
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        if !path.exists() {
            return Err(PhishGuardError::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data file not found: {}", path.display()),
            )));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        debug!(path = %path.display(), rows = df.height(), cols = df.width(), "loaded csv");
        Ok(df)
    }
}

/// CSV writer
pub struct DataSaver;

impl DataSaver {
    /// Write `df` as CSV at `path`, atomically
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        write_atomic(path, |writer| {
            CsvWriter::new(writer).include_header(true).finish(df)?;
            Ok(())
        })
    }
}

/// Column names in frame order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// One column cast to f64, nulls kept as `None`
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let ca = series.f64()?;
    Ok(ca.into_iter().collect())
}

/// Observed (non-null, non-NaN) values of a column
pub fn observed_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(column_values(df, name)?
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect())
}

/// Gather `columns` into a row-major matrix; nulls become `NaN`
pub fn frame_to_array(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let mut out = Array2::from_elem((n_rows, columns.len()), f64::NAN);

    for (j, name) in columns.iter().enumerate() {
        let values = column_values(df, name)?;
        for (i, value) in values.into_iter().enumerate() {
            if let Some(v) = value {
                out[[i, j]] = v;
            }
        }
    }

    Ok(out)
}
