//! Core types for the chronic absenteeism predictor
//!
//! Shared by the trainer and the command line front end.
//!
//! Modules:
//! - `table`: loosely typed in-memory table built from uploads
//! - `features`: fixed column names, category vocabulary, feature matrix
//! - `gbdt`: boosted-tree classifier model and trees
//! - `explain`: TreeSHAP attributions and the top-k ranking
//! - `config`: YAML-backed hyperparameter configuration
//! - `serde_canon`: canonical JSON, hashing and atomic file writes
//! - `errors`: the pipeline error taxonomy

pub mod config;
pub mod errors;
pub mod explain;
pub mod features;
pub mod gbdt;
pub mod serde_canon;
pub mod table;

pub use config::{
    ConfigManager, HyperParamUpdate, HyperParams, PipelineConfig, ScalePosWeight, TrainingConfig,
    DEFAULT_CONFIG_PATH,
};
pub use errors::{PipelineError, Result};
pub use explain::{explain, Attribution, ShapValues, TreeExplainer, DEFAULT_TOP_K};
pub use features::{
    CategoryGroup, CategoryVocabulary, FeatureMatrix, ABSENCE_THRESHOLD, ATTENDANCE_COLUMN,
    CATEGORICAL_COLUMNS, ID_COLUMN, LABEL_COLUMN, NON_FEATURE_COLUMNS,
};
pub use gbdt::{Model, ModelMetadata, Node, Tree};
pub use table::{Column, Table, Value};

/// Crate version string for model metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
