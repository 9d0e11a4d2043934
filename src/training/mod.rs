//! Model training
//!
//! Provides the candidate model families, hyperparameter search and the
//! training stage that promotes one calibrated model:
//! - Logistic regression
//! - Decision trees and random forests
//! - Gradient boosting
//! - AdaBoost

mod grid_search;
mod metrics;
mod models;
mod params;
mod selection;
mod trainer;
pub mod adaboost;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod random_forest;

pub use adaboost::AdaBoostClassifier;
pub use cross_validation::{CVSplit, StratifiedKFold};
pub use decision_tree::{Criterion, DecisionTree, MaxFeatures, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use grid_search::{CVResult, GridSearch, GridSearchResult};
pub use linear_models::LogisticRegression;
pub use metrics::{accuracy, ClassificationMetrics};
pub use models::{Classifier, Estimator, ModelFamily};
pub use params::{describe, expand_grid, ParamGrid, ParamSet, ParamValue};
pub use random_forest::{ClassWeight, RandomForest};
pub use selection::{CandidateModel, CandidateReport, ModelSelector, PromotionGates, SelectionOutcome};
pub use trainer::ModelTrainer;
