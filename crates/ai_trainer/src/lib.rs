//! Absence AI Trainer - training pipeline for the chronic absenteeism model
//!
//! Loads student uploads, derives the label and one-hot features, fits the
//! boosted-tree classifier deterministically and ranks the risk factors
//! behind its predictions.

pub mod cart;
pub mod deterministic;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod trainer;

pub use deterministic::{train_test_split, LcgRng, Split};
pub use loader::{load_path, load_upload, UploadFormat};
pub use metrics::ClassificationMetrics;
pub use pipeline::{explain_table, explain_upload, Pipeline, RunReport};
pub use preprocess::{absence_label, preprocess, preprocess_with, ProcessedTable};
pub use report::{
    render_metrics, render_svg, render_text, stage_svg_chart, write_svg_chart, CHART_TITLE,
};
pub use trainer::{resolve_scale_pos_weight, GbdtTrainer, TrainingOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
