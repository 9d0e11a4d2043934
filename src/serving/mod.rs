//! Prediction with the promoted model
//!
//! [`PhishingModel`] bundles the fitted transformer with the calibrated
//! classifier. The serving process loads the production bundle once with
//! [`init_production`] and reads it through [`production`] afterwards.

mod extractor;

pub use extractor::{FeatureExtractor, PrecomputedFeatures};

use crate::calibration::CalibratedClassifier;
use crate::error::{ErrorKind, PhishGuardError, Result};
use crate::training::{Classifier, ModelFamily};
use crate::transformation::FeatureTransformer;
use crate::utils::{frame_to_array, load_json, save_json};
use ndarray::{Array1, Array2};
use polars::prelude::{Column, DataFrame};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Column appended by batch prediction
pub const PREDICTED_COLUMN: &str = "predicted_column";

/// Verdict for a single URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Legitimate,
    Phishing,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Legitimate => f.write_str("legitimate"),
            Verdict::Phishing => f.write_str("phishing"),
        }
    }
}

/// Scored URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub url: String,
    pub label: Verdict,
    pub p_legitimate: f64,
    pub p_phishing: f64,
}

/// Transformer and calibrated model shipped together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhishingModel {
    transformer: FeatureTransformer,
    model: CalibratedClassifier,
    /// Encoded label that means phishing
    phishing_class: f64,
    /// Order of extracted URL vectors; the schema's feature order
    feature_order: Vec<String>,
}

impl PhishingModel {
    pub fn new(transformer: FeatureTransformer, model: CalibratedClassifier, phishing_class: f64) -> Result<Self> {
        if !transformer.is_fitted() {
            return Err(PhishGuardError::invalid_input("transformer must be fitted before bundling"));
        }
        if phishing_class != 0.0 && phishing_class != 1.0 {
            return Err(PhishGuardError::config(format!(
                "phishing_class must be 0 or 1, got {phishing_class}"
            )));
        }
        let feature_order = transformer.input_columns().to_vec();
        Ok(Self {
            transformer,
            model,
            phishing_class,
            feature_order,
        })
    }

    /// Read URL vectors in `order` instead of the transformer's input order.
    /// `order` must name exactly the transformer's input columns.
    pub fn with_feature_order(mut self, order: Vec<String>) -> Result<Self> {
        let expected: BTreeSet<&str> = self.transformer.input_columns().iter().map(String::as_str).collect();
        let actual: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        if expected != actual || actual.len() != order.len() {
            return Err(PhishGuardError::new(ErrorKind::SchemaMismatch {
                missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
                extra: actual.difference(&expected).map(|s| s.to_string()).collect(),
            }));
        }
        self.feature_order = order;
        Ok(self)
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    pub fn transformer(&self) -> &FeatureTransformer {
        &self.transformer
    }

    /// Number of raw features a row must have
    pub fn n_features(&self) -> usize {
        self.transformer.n_features()
    }

    /// Feature names in the order URL vectors are read
    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    /// Reorder a vector given in `feature_order` into the transformer's input order
    fn to_input_row(&self, vector: &[f64]) -> Result<Array2<f64>> {
        let by_name: HashMap<&str, f64> = self
            .feature_order
            .iter()
            .map(String::as_str)
            .zip(vector.iter().copied())
            .collect();
        let row = self
            .transformer
            .input_columns()
            .iter()
            .map(|name| {
                by_name
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| PhishGuardError::invalid_input(format!("feature order has no column {name}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array2::from_shape_vec((1, row.len()), row)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model: Self = load_json(path)?;
        debug!(path = %path.display(), family = %model.family(), "loaded phishing model");
        Ok(model)
    }

    /// Encoded labels for raw rows ordered like the transformer's input columns
    pub fn predict_rows(&self, rows: &Array2<f64>) -> Result<Array1<f64>> {
        let features = self.transformer.transform_rows(rows)?;
        self.model.predict(&features)
    }

    /// Encoded labels for a frame with the training feature columns
    pub fn predict_frame(&self, frame: &DataFrame) -> Result<Array1<f64>> {
        let rows = frame_to_array(frame, self.transformer.input_columns())?;
        self.predict_rows(&rows)
    }

    /// `frame` with [`PREDICTED_COLUMN`] appended
    pub fn annotate_frame(&self, frame: &DataFrame) -> Result<DataFrame> {
        let predictions = self.predict_frame(frame)?;
        let mut annotated = frame.clone();
        annotated.with_column(Column::new(PREDICTED_COLUMN.into(), predictions.to_vec()))?;
        Ok(annotated)
    }

    /// P(phishing) per raw row
    pub fn phishing_probability(&self, rows: &Array2<f64>) -> Result<Array1<f64>> {
        let features = self.transformer.transform_rows(rows)?;
        let p_class_one = self.model.predict_proba(&features)?;
        Ok(if self.phishing_class == 1.0 {
            p_class_one
        } else {
            p_class_one.mapv(|p| 1.0 - p)
        })
    }

    /// Score one URL through `extractor`
    pub fn predict_url(&self, extractor: &dyn FeatureExtractor, url: &str, threshold: f64) -> Result<Prediction> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PhishGuardError::invalid_input(format!(
                "threshold must be in [0, 1], got {threshold}"
            )));
        }

        let vector = extractor.extract(url)?;
        if vector.len() != self.feature_order.len() {
            return Err(PhishGuardError::shape(
                format!("{} features", self.feature_order.len()),
                format!("{} features for {url}", vector.len()),
            ));
        }

        let row = self.to_input_row(&vector)?;
        let p_phishing = self.phishing_probability(&row)?[0];
        let label = if p_phishing >= threshold {
            Verdict::Phishing
        } else {
            Verdict::Legitimate
        };

        Ok(Prediction {
            url: url.to_string(),
            label,
            p_legitimate: 1.0 - p_phishing,
            p_phishing,
        })
    }

    /// Score comma- or newline-separated URLs, skipping blanks
    pub fn predict_urls(&self, extractor: &dyn FeatureExtractor, urls: &str, threshold: f64) -> Result<Vec<Prediction>> {
        split_urls(urls)
            .map(|url| self.predict_url(extractor, url, threshold))
            .collect()
    }
}

/// Individual URLs in a comma- or newline-separated list
pub fn split_urls(text: &str) -> impl Iterator<Item = &str> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|url| !url.is_empty())
}

static PRODUCTION: OnceLock<PhishingModel> = OnceLock::new();

/// Load the production model once; later calls return the loaded model
pub fn init_production(path: &Path) -> Result<&'static PhishingModel> {
    if let Some(model) = PRODUCTION.get() {
        return Ok(model);
    }
    let model = PhishingModel::load(path)?;
    info!(path = %path.display(), family = %model.family(), "production model loaded");
    Ok(PRODUCTION.get_or_init(|| model))
}

/// The production model, if [`init_production`] has run
pub fn production() -> Option<&'static PhishingModel> {
    PRODUCTION.get()
}
