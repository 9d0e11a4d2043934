//! Dataset schema and column conformance
//!
//! A schema is an ordered mapping from required column name to a type
//! descriptor. Only key presence is checked; the descriptor is informational.
//! Column order is significant: it fixes the order of feature vectors
//! produced for single-URL prediction.

use crate::error::{ErrorKind, PhishGuardError, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info};

/// The 30 URL features of the phishing dataset, in vector order
pub const PHISHING_FEATURES: [&str; 30] = [
    "Domain_registeration_length",
    "age_of_domain",
    "web_traffic",
    "Page_Rank",
    "Links_pointing_to_page",
    "Statistical_report",
    "having_IP_Address",
    "URL_Length",
    "Shortining_Service",
    "having_At_Symbol",
    "double_slash_redirecting",
    "Prefix_Suffix",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Favicon",
    "port",
    "HTTPS_token",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "Submitting_to_email",
    "Abnormal_URL",
    "Redirect",
    "on_mouseover",
    "RightClick",
    "popUpWidnow",
    "Iframe",
    "DNSRecord",
    "Google_Index",
];

/// Result of comparing a frame's columns against the schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnCheck {
    /// Required by the schema but absent from the frame
    pub missing: Vec<String>,
    /// Present in the frame but not in the schema
    pub extra: Vec<String>,
}

impl ColumnCheck {
    pub fn is_conformant(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Required columns of a dataset split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Map<String, Value>,
}

impl Schema {
    /// Build from `(name, type)` pairs in order
    pub fn from_columns<I, N, T>(columns: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(name, dtype)| (name.into(), Value::String(dtype.into())))
            .collect();
        Self { columns }
    }

    /// The phishing dataset schema: 30 integer-coded features plus the label
    pub fn phishing(target_column: &str) -> Self {
        Self::from_columns(
            PHISHING_FEATURES
                .iter()
                .map(|name| (*name, "int64"))
                .chain(std::iter::once((target_column, "int64"))),
        )
    }

    /// Load a JSON schema file of the form `{"columns": {"name": "type", ...}}`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let schema: Self = serde_json::from_str(&text)?;
        if schema.columns.is_empty() {
            return Err(PhishGuardError::config(format!(
                "schema {} declares no columns",
                path.display()
            )));
        }
        info!(path = %path.display(), columns = schema.len(), "loaded schema");
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Required column names in declared order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Declared columns other than `target`, in order
    pub fn feature_columns(&self, target: &str) -> Vec<String> {
        self.columns
            .keys()
            .filter(|name| name.as_str() != target)
            .cloned()
            .collect()
    }

    /// Symmetric difference between required and actual column names
    pub fn check_columns<S: AsRef<str>>(&self, actual: &[S]) -> ColumnCheck {
        let actual: BTreeSet<&str> = actual.iter().map(|s| s.as_ref()).collect();
        let required: BTreeSet<&str> = self.columns.keys().map(|s| s.as_str()).collect();

        ColumnCheck {
            missing: required.difference(&actual).map(|s| s.to_string()).collect(),
            extra: actual.difference(&required).map(|s| s.to_string()).collect(),
        }
    }

    /// True iff the frame's column-name set equals the schema's
    pub fn validate_columns(&self, df: &DataFrame) -> bool {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        self.check_columns(&names).is_conformant()
    }

    /// Fail with `SchemaMismatch` unless the frame conforms
    #[track_caller]
    pub fn require_columns(&self, df: &DataFrame, split: &str) -> Result<()> {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let check = self.check_columns(&names);
        if check.is_conformant() {
            return Ok(());
        }

        error!(
            split,
            missing = ?check.missing,
            extra = ?check.extra,
            "schema mismatch"
        );
        Err(PhishGuardError::new(ErrorKind::SchemaMismatch {
            missing: check.missing,
            extra: check.extra,
        }))
    }
}
