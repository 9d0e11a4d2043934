//! Candidate model families and the common classifier interface

use super::adaboost::AdaBoostClassifier;
use super::decision_tree::{Criterion, DecisionTree, MaxFeatures};
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::linear_models::LogisticRegression;
use super::params::{ParamGrid, ParamReader, ParamSet, ParamValue};
use super::random_forest::{ClassWeight, RandomForest};
use crate::error::{PhishGuardError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary classifier over labels `{0, 1}`
pub trait Classifier: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Uncalibrated score, larger means more likely class 1
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// P(y = 1)
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard labels, class 1 when P(y = 1) > 0.5
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }
}

/// The registry of candidate families, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression,
    DecisionTree,
    RandomForest,
    GradientBoosting,
    #[serde(rename = "adaboost")]
    AdaBoost,
}

impl ModelFamily {
    pub fn all() -> [ModelFamily; 5] {
        [
            ModelFamily::LogisticRegression,
            ModelFamily::DecisionTree,
            ModelFamily::RandomForest,
            ModelFamily::GradientBoosting,
            ModelFamily::AdaBoost,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::GradientBoosting => "gradient_boosting",
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::AdaBoost => "adaboost",
        }
    }

    /// Parameter names a configuration may set
    fn allowed_params(self) -> &'static [&'static str] {
        match self {
            ModelFamily::RandomForest => &["n_estimators", "max_depth", "min_samples_leaf", "max_features", "criterion", "class_weight"],
            ModelFamily::DecisionTree => &["max_depth", "min_samples_leaf", "max_features", "criterion"],
            ModelFamily::GradientBoosting => &["n_estimators", "learning_rate", "subsample", "max_depth", "min_samples_leaf"],
            ModelFamily::LogisticRegression => &["C", "max_iter", "penalty", "solver"],
            ModelFamily::AdaBoost => &["n_estimators", "learning_rate"],
        }
    }

    /// Hyperparameter grid searched for this family
    pub fn default_grid(self) -> ParamGrid {
        let ints = |vals: &[i64]| vals.iter().map(|&v| ParamValue::Int(v)).collect::<Vec<_>>();
        let floats = |vals: &[f64]| vals.iter().map(|&v| ParamValue::Float(v)).collect::<Vec<_>>();

        let mut grid = ParamGrid::new();
        match self {
            ModelFamily::RandomForest => {
                grid.insert("n_estimators".into(), ints(&[50, 100, 200]));
                grid.insert(
                    "max_features".into(),
                    vec![ParamValue::str("sqrt"), ParamValue::str("log2"), ParamValue::None],
                );
                grid.insert("class_weight".into(), vec![ParamValue::str("balanced")]);
            }
            ModelFamily::DecisionTree => {
                grid.insert(
                    "max_depth".into(),
                    vec![ParamValue::None, ParamValue::Int(5), ParamValue::Int(10), ParamValue::Int(20)],
                );
                grid.insert("min_samples_leaf".into(), ints(&[1, 3, 5]));
                grid.insert("criterion".into(), vec![ParamValue::str("gini"), ParamValue::str("entropy")]);
            }
            ModelFamily::GradientBoosting => {
                grid.insert("n_estimators".into(), ints(&[50, 100, 200]));
                grid.insert("learning_rate".into(), floats(&[0.1, 0.05, 0.01]));
                grid.insert("subsample".into(), floats(&[0.6, 0.8, 1.0]));
            }
            ModelFamily::LogisticRegression => {
                grid.insert("penalty".into(), vec![ParamValue::str("l2")]);
                grid.insert("C".into(), floats(&[0.01, 0.1, 1.0, 10.0]));
                grid.insert("solver".into(), vec![ParamValue::str("lbfgs")]);
            }
            ModelFamily::AdaBoost => {
                grid.insert("n_estimators".into(), ints(&[50, 100, 200]));
                grid.insert("learning_rate".into(), floats(&[0.1, 0.01, 0.001]));
            }
        }
        grid
    }

    /// Instantiate an untrained estimator; unset parameters take library defaults
    pub fn build(self, params: &ParamSet, seed: u64) -> Result<Estimator> {
        let reader = ParamReader::new(self.name(), params, self.allowed_params())?;

        let estimator = match self {
            ModelFamily::RandomForest => {
                let mut rf = RandomForest::new(reader.usize_or("n_estimators", 100)?)
                    .with_max_features(parse_max_features(reader.opt_str("max_features")?, params, MaxFeatures::Sqrt)?)
                    .with_class_weight(parse_class_weight(reader.opt_str("class_weight")?)?)
                    .with_random_state(seed);
                rf.max_depth = reader.opt_usize_or("max_depth", None)?;
                rf.min_samples_leaf = reader.usize_or("min_samples_leaf", 1)?.max(1);
                rf.criterion = parse_criterion(reader.opt_str("criterion")?)?;
                Estimator::RandomForest(rf)
            }
            ModelFamily::DecisionTree => Estimator::DecisionTree(
                DecisionTree::new_classifier()
                    .with_max_depth(reader.opt_usize_or("max_depth", None)?)
                    .with_min_samples_leaf(reader.usize_or("min_samples_leaf", 1)?)
                    .with_criterion(parse_criterion(reader.opt_str("criterion")?)?)
                    .with_max_features(parse_max_features(reader.opt_str("max_features")?, params, MaxFeatures::All)?)
                    .with_random_state(seed),
            ),
            ModelFamily::GradientBoosting => {
                let config = GradientBoostingConfig {
                    n_estimators: reader.usize_or("n_estimators", 100)?,
                    learning_rate: reader.f64_or("learning_rate", 0.1)?,
                    subsample: reader.f64_or("subsample", 1.0)?,
                    max_depth: reader.usize_or("max_depth", 3)?,
                    min_samples_leaf: reader.usize_or("min_samples_leaf", 1)?,
                    random_state: seed,
                };
                Estimator::GradientBoosting(GradientBoostingClassifier::new(config))
            }
            ModelFamily::LogisticRegression => {
                check_choice(self, "penalty", reader.opt_str("penalty")?, &["l2"])?;
                check_choice(self, "solver", reader.opt_str("solver")?, &["lbfgs", "newton-cg"])?;
                Estimator::LogisticRegression(
                    LogisticRegression::new()
                        .with_c(reader.f64_or("C", 1.0)?)
                        .with_max_iter(reader.usize_or("max_iter", 1000)?),
                )
            }
            ModelFamily::AdaBoost => Estimator::AdaBoost(AdaBoostClassifier::new(
                reader.usize_or("n_estimators", 50)?,
                reader.f64_or("learning_rate", 1.0)?,
            )),
        };

        Ok(estimator)
    }
}

/// Accept only the choices the native solver implements
fn check_choice(family: ModelFamily, name: &str, value: Option<&str>, supported: &[&str]) -> Result<()> {
    match value {
        Some(v) if !supported.contains(&v) => Err(PhishGuardError::config(format!(
            "{family}: {name}={v:?} is not supported, expected one of {supported:?}"
        ))),
        _ => Ok(()),
    }
}

fn parse_criterion(value: Option<&str>) -> Result<Criterion> {
    match value {
        None | Some("gini") => Ok(Criterion::Gini),
        Some("entropy") | Some("log_loss") => Ok(Criterion::Entropy),
        Some(other) => Err(PhishGuardError::config(format!("unknown criterion {other:?}"))),
    }
}

/// `max_features`: "sqrt", "log2", or None for all features.
/// An explicit None in the grid means "all", an absent key means `default`.
fn parse_max_features(value: Option<&str>, params: &ParamSet, default: MaxFeatures) -> Result<MaxFeatures> {
    match value {
        Some("sqrt") => Ok(MaxFeatures::Sqrt),
        Some("log2") => Ok(MaxFeatures::Log2),
        Some(other) => Err(PhishGuardError::config(format!("unknown max_features {other:?}"))),
        None if params.contains_key("max_features") => Ok(MaxFeatures::All),
        None => Ok(default),
    }
}

fn parse_class_weight(value: Option<&str>) -> Result<ClassWeight> {
    match value {
        None => Ok(ClassWeight::Uniform),
        Some("balanced") => Ok(ClassWeight::Balanced),
        Some(other) => Err(PhishGuardError::config(format!("unknown class_weight {other:?}"))),
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = PhishGuardError;

    fn from_str(s: &str) -> Result<Self> {
        ModelFamily::all()
            .into_iter()
            .find(|family| family.name() == s)
            .ok_or_else(|| PhishGuardError::config(format!("unknown model family {s:?}")))
    }
}

/// A concrete estimator of one of the registered families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest(RandomForest),
    DecisionTree(DecisionTree),
    GradientBoosting(GradientBoostingClassifier),
    LogisticRegression(LogisticRegression),
    #[serde(rename = "adaboost")]
    AdaBoost(AdaBoostClassifier),
}

impl Estimator {
    pub fn family(&self) -> ModelFamily {
        match self {
            Estimator::RandomForest(_) => ModelFamily::RandomForest,
            Estimator::DecisionTree(_) => ModelFamily::DecisionTree,
            Estimator::GradientBoosting(_) => ModelFamily::GradientBoosting,
            Estimator::LogisticRegression(_) => ModelFamily::LogisticRegression,
            Estimator::AdaBoost(_) => ModelFamily::AdaBoost,
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Estimator::RandomForest(m) => m.fit(x, y).map(|_| ()),
            Estimator::DecisionTree(m) => m.fit(x, y).map(|_| ()),
            Estimator::GradientBoosting(m) => m.fit(x, y),
            Estimator::LogisticRegression(m) => m.fit(x, y).map(|_| ()),
            Estimator::AdaBoost(m) => m.fit(x, y),
        }
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            // Tree ensembles without a margin expose their probability
            Estimator::RandomForest(m) => m.predict_proba(x),
            Estimator::DecisionTree(m) => m.predict_value(x),
            Estimator::GradientBoosting(m) => m.decision_function(x),
            Estimator::LogisticRegression(m) => m.decision_function(x),
            Estimator::AdaBoost(m) => m.decision_function(x),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::RandomForest(m) => m.predict_proba(x),
            Estimator::DecisionTree(m) => m.predict_value(x),
            Estimator::GradientBoosting(m) => m.predict_proba(x),
            Estimator::LogisticRegression(m) => m.predict_proba(x),
            Estimator::AdaBoost(m) => m.predict_proba(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::params::expand_grid;

    #[test]
    fn test_family_names_round_trip() {
        for family in ModelFamily::all() {
            assert_eq!(family.name().parse::<ModelFamily>().unwrap(), family);
            let json = serde_json::to_string(&family).unwrap();
            assert_eq!(json, format!("\"{}\"", family.name()));
        }
        assert!("svm".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_grid_sizes() {
        let sizes: Vec<usize> = ModelFamily::all()
            .iter()
            .map(|f| expand_grid(&f.default_grid()).len())
            .collect();
        assert_eq!(sizes, vec![4, 24, 9, 27, 9]);
    }

    #[test]
    fn test_every_grid_point_builds() {
        for family in ModelFamily::all() {
            for params in expand_grid(&family.default_grid()) {
                let estimator = family.build(&params, 42).unwrap();
                assert_eq!(estimator.family(), family);
            }
        }
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut params = ParamSet::new();
        params.insert("kernel".into(), ParamValue::str("rbf"));
        assert!(ModelFamily::LogisticRegression.build(&params, 0).is_err());
    }

    #[test]
    fn test_explicit_none_max_features_means_all() {
        let mut params = ParamSet::new();
        params.insert("max_features".into(), ParamValue::None);
        match ModelFamily::RandomForest.build(&params, 0).unwrap() {
            Estimator::RandomForest(rf) => assert_eq!(rf.max_features, MaxFeatures::All),
            other => panic!("unexpected estimator {:?}", other.family()),
        }
    }
}
