//! Classifier pipeline for the learned signal engine.
//!
//! - [`dataset`]: feature rows, bounded history, training-set construction
//! - [`scaler`]: z-score feature scaling
//! - [`tree`] / [`forest`]: gini decision trees and a bootstrap random forest
//! - [`cv`]: forward-chaining cross-validation and depth selection

pub mod cv;
pub mod dataset;
pub mod forest;
pub mod scaler;
pub mod tree;

pub use dataset::{Dataset, FeatureHistory, FeatureRow, TrainingSet, build_training_set};
pub use forest::{ForestConfig, RandomForest};
pub use scaler::StandardScaler;

/// Why a model could not be fitted. Always recovered locally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("training labels contain a single class")]
    SingleClass,

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("non-finite feature value at row {row}, column {column}")]
    NonFiniteFeature { row: usize, column: usize },

    #[error("feature width mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}
