//! Hyperparameter values and grids

use crate::error::{PhishGuardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    None,
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn str(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// One concrete configuration
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Parameter name to candidate values
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// Every combination of `grid`, names sorted, last name varying fastest
pub fn expand_grid(grid: &ParamGrid) -> Vec<ParamSet> {
    let mut combos: Vec<ParamSet> = vec![ParamSet::new()];

    for (name, values) in grid {
        if values.is_empty() {
            return Vec::new();
        }
        combos = combos
            .into_iter()
            .flat_map(|base| {
                values.iter().map(move |v| {
                    let mut next = base.clone();
                    next.insert(name.clone(), v.clone());
                    next
                })
            })
            .collect();
    }

    combos
}

/// `k=v` pairs for logs and reports
pub fn describe(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Typed access to a configuration, rejecting unknown names
pub(crate) struct ParamReader<'a> {
    family: &'a str,
    params: &'a ParamSet,
}

impl<'a> ParamReader<'a> {
    pub(crate) fn new(family: &'a str, params: &'a ParamSet, allowed: &[&str]) -> Result<Self> {
        if let Some(unknown) = params.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(PhishGuardError::config(format!(
                "unknown parameter {unknown:?} for {family}, expected one of {allowed:?}"
            )));
        }
        Ok(Self { family, params })
    }

    fn invalid(&self, name: &str, value: &ParamValue, expected: &str) -> PhishGuardError {
        PhishGuardError::config(format!(
            "{}: parameter {name} = {value} is not {expected}",
            self.family
        ))
    }

    pub(crate) fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.params.get(name) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(self.invalid(name, other, "a number")),
        }
    }

    pub(crate) fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.params.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(*v as usize),
            Some(other) => Err(self.invalid(name, other, "a non-negative integer")),
        }
    }

    /// `None` in the grid means "unbounded"
    pub(crate) fn opt_usize_or(&self, name: &str, default: Option<usize>) -> Result<Option<usize>> {
        match self.params.get(name) {
            None => Ok(default),
            Some(ParamValue::None) => Ok(None),
            Some(ParamValue::Int(v)) if *v > 0 => Ok(Some(*v as usize)),
            Some(other) => Err(self.invalid(name, other, "a positive integer or None")),
        }
    }

    /// String parameter; `None` maps to `Option::None`
    pub(crate) fn opt_str(&self, name: &str) -> Result<Option<&'a str>> {
        match self.params.get(name) {
            None | Some(ParamValue::None) => Ok(None),
            Some(ParamValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(name, other, "a string")),
        }
    }
}
