//! End-to-end training session
//!
//! `load → preprocess → fit → metrics → explain → chart → persist`.
//! Chart and model are both staged as temp files next to their targets
//! before either target is replaced. The model is then renamed into place,
//! followed by the chart, so any failure up to that point leaves both
//! previous artifacts as they were.

use absence_ai_core::{
    explain, Attribution, FeatureMatrix, Model, PipelineConfig, Result, Table,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::loader::{load_path, load_upload};
use crate::metrics::ClassificationMetrics;
use crate::preprocess::{preprocess, preprocess_with};
use crate::report::stage_svg_chart;
use crate::trainer::GbdtTrainer;

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub model: Model,
    pub metrics: ClassificationMetrics,
    pub ranking: Vec<Attribution>,
    pub scale_pos_weight: f64,
    pub rows: usize,
    pub positives: usize,
    pub model_path: PathBuf,
    pub chart_path: PathBuf,
}

/// One session over a configuration snapshot
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on an upload identified by its file name
    pub fn run<R: Read>(&self, reader: R, name: &str) -> Result<RunReport> {
        let table = load_upload(reader, name)?;
        self.run_table(&table)
    }

    pub fn run_path<P: AsRef<Path>>(&self, path: P) -> Result<RunReport> {
        let table = load_path(path)?;
        self.run_table(&table)
    }

    /// Run on an already loaded table
    pub fn run_table(&self, table: &Table) -> Result<RunReport> {
        let training = &self.config.training;

        let processed = preprocess(table)?;
        info!(
            "{} of {} students at or below the attendance threshold",
            processed.positives(),
            processed.labels.len()
        );

        let trainer = GbdtTrainer::new(self.config.xgboost.clone(), training.clone());
        let outcome = trainer.fit(&processed)?;

        let matrix = FeatureMatrix::from_table(&processed.table)?;
        let ranking = explain(&outcome.model, &matrix, training.top_k)?;

        let chart = stage_svg_chart(&ranking, &training.chart_path)?;
        let model_file = outcome.model.stage_json(&training.model_path)?;

        model_file.commit()?;
        info!("Model saved to {}", training.model_path.display());
        chart.commit()?;
        info!("Chart written to {}", training.chart_path.display());

        Ok(RunReport {
            model: outcome.model,
            metrics: outcome.metrics,
            ranking,
            scale_pos_weight: outcome.scale_pos_weight,
            rows: processed.labels.len(),
            positives: processed.positives(),
            model_path: training.model_path.clone(),
            chart_path: training.chart_path.clone(),
        })
    }
}

/// Rank the features of `table` under an already trained model, encoding
/// the categories with the model's own vocabulary
pub fn explain_table(model: &Model, table: &Table, top_k: usize) -> Result<Vec<Attribution>> {
    let processed = preprocess_with(table, &model.vocabulary)?;
    let matrix = FeatureMatrix::from_table(&processed.table)?;
    explain(model, &matrix, top_k)
}

pub fn explain_upload<R: Read>(
    model: &Model,
    reader: R,
    name: &str,
    top_k: usize,
) -> Result<Vec<Attribution>> {
    let table = load_upload(reader, name)?;
    explain_table(model, &table, top_k)
}
