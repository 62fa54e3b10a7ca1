//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Implements deterministic GBDT training for binary classification with
//! logistic loss, per-row class weights and exact-greedy CART splits.

use absence_ai_core::{
    gbdt::sigmoid, FeatureMatrix, HyperParams, Model, PipelineError, Result, ScalePosWeight,
    TrainingConfig,
};
use tracing::{debug, info, warn};

use crate::cart::{CartBuilder, TreeConfig};
use crate::deterministic::{train_test_split, Split};
use crate::metrics::{log_loss, ClassificationMetrics};
use crate::preprocess::ProcessedTable;

/// Prior probability the ensemble starts from
pub const BASE_SCORE: f64 = 0.5;

/// Resolve `"auto"` to negatives / positives over all labels
pub fn resolve_scale_pos_weight(setting: ScalePosWeight, labels: &[u8]) -> Result<f64> {
    match setting {
        ScalePosWeight::Ratio(ratio) => Ok(ratio),
        ScalePosWeight::Auto => {
            let positives = labels.iter().filter(|&&l| l == 1).count();
            let negatives = labels.len() - positives;
            if positives == 0 {
                return Err(PipelineError::Arithmetic(format!(
                    "scale_pos_weight=auto needs at least one positive label ({} negatives, 0 positives)",
                    negatives
                )));
            }
            if negatives == 0 {
                warn!("All {} rows are positive; scale_pos_weight resolves to 0", positives);
            }
            Ok(negatives as f64 / positives as f64)
        }
    }
}

/// Everything a fit produces besides the side effects
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: Model,
    pub split: Split,
    pub scale_pos_weight: f64,
    /// Held-out log-loss after each boosting round
    pub eval_history: Vec<f64>,
    pub metrics: ClassificationMetrics,
}

/// GBDT trainer
pub struct GbdtTrainer {
    params: HyperParams,
    training: TrainingConfig,
}

impl GbdtTrainer {
    pub fn new(params: HyperParams, training: TrainingConfig) -> Self {
        Self { params, training }
    }

    /// Fit a model on a processed table without touching the filesystem
    pub fn fit(&self, processed: &ProcessedTable) -> Result<TrainingOutcome> {
        self.params.validate()?;
        self.training.validate()?;

        let matrix = FeatureMatrix::from_table(&processed.table)?;
        if matrix.feature_count() == 0 {
            return Err(PipelineError::Schema("no feature columns to train on".to_string()));
        }
        let labels = &processed.labels;

        let scale_pos_weight = resolve_scale_pos_weight(self.params.scale_pos_weight, labels)?;
        let split = train_test_split(matrix.len(), self.training.test_size, self.training.seed)?;

        let train_x = matrix.select_rows(&split.train);
        let train_y: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
        let holdout_x = matrix.select_rows(&split.holdout);
        let holdout_y: Vec<u8> = split.holdout.iter().map(|&i| labels[i]).collect();

        info!(
            "Training on {} rows, holding out {} ({} features, scale_pos_weight={:.4})",
            train_x.len(),
            holdout_x.len(),
            matrix.feature_count(),
            scale_pos_weight
        );

        let weights: Vec<f64> = train_y
            .iter()
            .map(|&y| if y == 1 { scale_pos_weight } else { 1.0 })
            .collect();

        let base_margin = (BASE_SCORE / (1.0 - BASE_SCORE)).ln();
        let mut train_margin = vec![base_margin; train_x.len()];
        let mut holdout_margin = vec![base_margin; holdout_x.len()];

        let tree_config = TreeConfig {
            max_depth: self.params.max_depth,
            min_child_weight: self.params.min_child_weight,
            reg_lambda: self.params.reg_lambda,
            gamma: self.params.gamma,
            learning_rate: self.params.learning_rate,
        };

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        let mut eval_history = Vec::with_capacity(self.params.n_estimators);
        let mut best_round = 0usize;
        let mut best_loss = f64::INFINITY;

        for round in 0..self.params.n_estimators {
            let (gradients, hessians) = gradients_hessians(&train_y, &weights, &train_margin);

            let tree =
                CartBuilder::new(&train_x.rows, &gradients, &hessians, tree_config.clone()).build();

            for (margin, row) in train_margin.iter_mut().zip(&train_x.rows) {
                *margin += tree.evaluate(row);
            }
            for (margin, row) in holdout_margin.iter_mut().zip(&holdout_x.rows) {
                *margin += tree.evaluate(row);
            }
            trees.push(tree);

            let probabilities: Vec<f64> = holdout_margin.iter().map(|&m| sigmoid(m)).collect();
            let loss = log_loss(&holdout_y, &probabilities);
            eval_history.push(loss);
            debug!("Round {}/{}: holdout logloss={:.6}", round + 1, self.params.n_estimators, loss);

            if loss < best_loss {
                best_loss = loss;
                best_round = round;
            } else if let Some(patience) = self.params.early_stopping_rounds {
                if round - best_round >= patience {
                    info!(
                        "Early stopping at round {}; best round {} (logloss={:.6})",
                        round + 1,
                        best_round + 1,
                        best_loss
                    );
                    break;
                }
            }
        }

        if self.params.early_stopping_rounds.is_some() {
            trees.truncate(best_round + 1);
        }

        let mut resolved = self.params.clone();
        resolved.scale_pos_weight = ScalePosWeight::Ratio(scale_pos_weight);

        let mut model = Model::new(
            trees,
            BASE_SCORE,
            matrix.names.clone(),
            processed.vocabulary.clone(),
            resolved,
        );
        model.validate()?;

        let holdout_probs: Vec<f64> = holdout_x.rows.iter().map(|r| model.predict_proba(r)).collect();
        let metrics = ClassificationMetrics::compute(&holdout_y, &holdout_probs);

        model.metadata.created_at = chrono::Utc::now().timestamp();
        model.metadata.train_rows = split.train.len();
        model.metadata.holdout_rows = split.holdout.len();
        model.metadata.best_iteration = model.num_trees();
        model.metadata.metrics = metrics.to_map();
        model.refresh_hash()?;

        info!(
            "Trained {} trees: accuracy={:.3} precision={:.3} recall={:.3}",
            model.num_trees(),
            metrics.accuracy,
            metrics.precision,
            metrics.recall
        );

        Ok(TrainingOutcome {
            model,
            split,
            scale_pos_weight,
            eval_history,
            metrics,
        })
    }

    /// Fit and persist the model to `training.model_path`, replacing any
    /// previous artifact
    pub fn train(&self, processed: &ProcessedTable) -> Result<TrainingOutcome> {
        let outcome = self.fit(processed)?;
        outcome.model.save_json(&self.training.model_path)?;
        info!("Model saved to {}", self.training.model_path.display());
        Ok(outcome)
    }
}

/// Weighted logistic-loss gradient `w (p - y)` and hessian `w p (1 - p)`
fn gradients_hessians(labels: &[u8], weights: &[f64], margins: &[f64]) -> (Vec<f64>, Vec<f64>) {
    labels
        .iter()
        .zip(weights)
        .zip(margins)
        .map(|((&y, &w), &m)| {
            let p = sigmoid(m);
            (w * (p - f64::from(y)), w * p * (1.0 - p))
        })
        .unzip()
}
