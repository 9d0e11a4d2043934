//! URL feature extraction boundary

use crate::error::{PhishGuardError, Result};
use crate::utils::load_json;
use std::collections::HashMap;
use std::path::Path;

/// Maps a URL to its feature vector, in the schema's feature order
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, url: &str) -> Result<Vec<f64>>;
}

/// Feature vectors computed ahead of time, keyed by URL
#[derive(Debug, Clone, Default)]
pub struct PrecomputedFeatures {
    vectors: HashMap<String, Vec<f64>>,
}

impl PrecomputedFeatures {
    pub fn new(vectors: HashMap<String, Vec<f64>>) -> Self {
        Self { vectors }
    }

    /// Load a JSON object of `url -> [features...]`
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(load_json(path)?))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl FeatureExtractor for PrecomputedFeatures {
    fn extract(&self, url: &str) -> Result<Vec<f64>> {
        self.vectors
            .get(url)
            .cloned()
            .ok_or_else(|| PhishGuardError::invalid_input(format!("no feature vector for {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_extract() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, r#"{"http://a.example": [1, -1, 0]}"#).unwrap();

        let features = PrecomputedFeatures::load(&path).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features.extract("http://a.example").unwrap(), vec![1.0, -1.0, 0.0]);
        assert!(features.extract("http://b.example").is_err());
    }
}
