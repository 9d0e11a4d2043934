//! Error types for the phishguard pipeline
//!
//! Every failure is normalized into [`PhishGuardError`], which pairs a typed
//! [`ErrorKind`] with the file and line where the error was raised. Call
//! sites are captured through `#[track_caller]`, including on the `From`
//! conversions, so a bare `?` records where the error crossed into the crate.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Result type alias for phishguard operations
pub type Result<T> = std::result::Result<T, PhishGuardError>;

/// Reason a pipeline operation failed
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Schema mismatch: missing columns {missing:?}, unexpected columns {extra:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("Data drift detected in columns {columns:?}")]
    DriftDetected { columns: Vec<String> },

    #[error("Test accuracy below expected: {family} scored {test_accuracy:.4}, required {expected:.4}")]
    AccuracyBelowExpected {
        family: String,
        test_accuracy: f64,
        expected: f64,
    },

    #[error(
        "Model is overfitting or underfitting: {family} train {train_accuracy:.4} vs test {test_accuracy:.4} (gap {gap:.4} > {max_gap:.4})"
    )]
    GeneralizationGap {
        family: String,
        train_accuracy: f64,
        test_accuracy: f64,
        gap: f64,
        max_gap: f64,
    },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,
}

/// Main error type: a failure reason plus the call site that raised it
#[derive(Debug)]
pub struct PhishGuardError {
    kind: ErrorKind,
    file: &'static str,
    line: u32,
}

impl PhishGuardError {
    /// Wrap a kind, recording the caller's location
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        let location = Location::caller();
        Self {
            kind,
            file: location.file(),
            line: location.line(),
        }
    }

    #[track_caller]
    pub fn data(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data(msg.into()))
    }

    #[track_caller]
    pub fn training(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Training(msg.into()))
    }

    #[track_caller]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config(msg.into()))
    }

    #[track_caller]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput(msg.into()))
    }

    #[track_caller]
    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::Shape {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Source file that raised the error
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Line that raised the error
    pub fn line(&self) -> u32 {
        self.line
    }

    /// True for drift, accuracy and generalization-gap failures
    pub fn is_quality_gate(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::DriftDetected { .. }
                | ErrorKind::AccuracyBelowExpected { .. }
                | ErrorKind::GeneralizationGap { .. }
        )
    }
}

impl fmt::Display for PhishGuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [at {}:{}]", self.kind, self.file, self.line)
    }
}

impl std::error::Error for PhishGuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ErrorKind> for PhishGuardError {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for PhishGuardError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }
}

impl From<polars::error::PolarsError> for PhishGuardError {
    #[track_caller]
    fn from(err: polars::error::PolarsError) -> Self {
        Self::new(ErrorKind::Data(err.to_string()))
    }
}

impl From<serde_json::Error> for PhishGuardError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Serialization(err.to_string()))
    }
}

impl From<toml::de::Error> for PhishGuardError {
    #[track_caller]
    fn from(err: toml::de::Error) -> Self {
        Self::new(ErrorKind::Config(err.to_string()))
    }
}

impl From<ndarray::ShapeError> for PhishGuardError {
    #[track_caller]
    fn from(err: ndarray::ShapeError) -> Self {
        Self::new(ErrorKind::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_location() {
        let err = PhishGuardError::data("test error");
        let text = err.to_string();
        assert!(text.starts_with("Data error: test error [at "));
        assert!(text.contains("error.rs"));
        assert_eq!(err.line(), line!() - 4);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PhishGuardError = io_err.into();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert!(!err.is_quality_gate());
    }

    #[test]
    fn test_question_mark_records_call_site() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(err.file().ends_with("error.rs"));
    }

    #[test]
    fn test_quality_gate_kinds() {
        let drift = PhishGuardError::new(ErrorKind::DriftDetected {
            columns: vec!["web_traffic".to_string()],
        });
        assert!(drift.is_quality_gate());

        let gap = PhishGuardError::new(ErrorKind::GeneralizationGap {
            family: "decision_tree".to_string(),
            train_accuracy: 1.0,
            test_accuracy: 0.7,
            gap: 0.3,
            max_gap: 0.05,
        });
        assert!(gap.is_quality_gate());
        assert!(gap.to_string().contains("overfitting"));

        let schema = PhishGuardError::new(ErrorKind::SchemaMismatch {
            missing: vec!["a".to_string()],
            extra: vec![],
        });
        assert!(!schema.is_quality_gate());
    }
}
