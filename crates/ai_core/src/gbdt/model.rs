//! Boosted-tree binary classifier
//!
//! Implements the trained model with:
//! - Logistic link over the summed tree margins
//! - The category vocabulary and feature order it was trained on
//! - Canonical JSON serialization and Blake3 structure hashing

use super::tree::Tree;
use crate::config::HyperParams;
use crate::errors::{PipelineError, Result};
use crate::features::{CategoryVocabulary, FeatureMatrix};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json, write_atomic, StagedFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Artifact format version
pub const MODEL_VERSION: i32 = 1;

/// Training provenance stored alongside the trees
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// Unix timestamp of training
    pub created_at: i64,
    pub train_rows: usize,
    pub holdout_rows: usize,
    /// Number of boosting rounds kept
    pub best_iteration: usize,
    /// Held-out metrics by name
    pub metrics: BTreeMap<String, f64>,
    /// Blake3 hash of the canonical tree structure
    pub model_hash: String,
}

/// Fitted classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    /// Model format version (always 1 for now)
    pub version: i32,

    /// Prior probability; its logit is the starting margin
    pub base_score: f64,

    /// Decision trees in the ensemble
    pub trees: Vec<Tree>,

    /// Feature order the trees index into
    pub feature_names: Vec<String>,

    /// One-hot vocabulary pinned at training time
    pub vocabulary: CategoryVocabulary,

    /// Hyperparameters with `scale_pos_weight` resolved
    pub params: HyperParams,

    pub metadata: ModelMetadata,
}

#[derive(Serialize)]
struct Structure<'a> {
    version: i32,
    base_score: f64,
    trees: &'a [Tree],
    feature_names: &'a [String],
}

impl Model {
    pub fn new(
        trees: Vec<Tree>,
        base_score: f64,
        feature_names: Vec<String>,
        vocabulary: CategoryVocabulary,
        params: HyperParams,
    ) -> Self {
        Self {
            version: MODEL_VERSION,
            base_score,
            trees,
            feature_names,
            vocabulary,
            params,
            metadata: ModelMetadata::default(),
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| PipelineError::Compatibility(format!("invalid model: {}", msg));

        if self.version != MODEL_VERSION {
            return Err(invalid(format!("unsupported version {}", self.version)));
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return Err(invalid(format!("base_score {} outside (0, 1)", self.base_score)));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len())
                .map_err(|e| invalid(format!("tree {}: {}", i, e)))?;
        }
        Ok(())
    }

    /// Starting margin before any tree
    pub fn base_margin(&self) -> f64 {
        (self.base_score / (1.0 - self.base_score)).ln()
    }

    /// Raw log-odds for one row in model feature order
    pub fn margin(&self, features: &[f64]) -> f64 {
        self.base_margin() + self.trees.iter().map(|t| t.evaluate(features)).sum::<f64>()
    }

    /// Probability of the positive class for one row
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.margin(features))
    }

    /// Probabilities for every row of a matrix, aligned by column name
    pub fn predict_proba_matrix(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        let aligned = matrix.aligned_to(&self.feature_names)?;
        Ok(aligned.rows.iter().map(|row| self.predict_proba(row)).collect())
    }

    /// Margin expected when no feature value is known
    pub fn expected_margin(&self) -> f64 {
        self.base_margin() + self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }

    /// Get number of trees in the model
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Hash of the parts that determine predictions
    pub fn structure_hash(&self) -> Result<String> {
        Ok(hash_canonical_hex(&Structure {
            version: self.version,
            base_score: self.base_score,
            trees: &self.trees,
            feature_names: &self.feature_names,
        })?)
    }

    /// Recompute `metadata.model_hash`
    pub fn refresh_hash(&mut self) -> Result<()> {
        self.metadata.model_hash = self.structure_hash()?;
        Ok(())
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(to_canonical_json(self)?)
    }

    /// Write the artifact, replacing any previous model at `path`
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_canonical_json()?;
        write_atomic(path.as_ref(), json.as_bytes())?;
        Ok(())
    }

    /// Write the artifact next to `path` without replacing the current model
    pub fn stage_json<P: AsRef<Path>>(&self, path: P) -> Result<StagedFile> {
        let json = self.to_canonical_json()?;
        Ok(StagedFile::new(path.as_ref(), json.as_bytes())?)
    }

    /// Load and validate a model artifact
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let model: Model = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    fn create_test_model() -> Model {
        let tree1 = Tree::new(vec![
            Node::internal(0, 0, 0.5, 1, 2, 10.0),
            Node::leaf(1, -0.4, 6.0),
            Node::leaf(2, 0.6, 4.0),
        ]);
        let tree2 = Tree::new(vec![
            Node::internal(0, 1, 2.0, 1, 2, 10.0),
            Node::leaf(1, 0.1, 5.0),
            Node::leaf(2, -0.1, 5.0),
        ]);

        Model::new(
            vec![tree1, tree2],
            0.5,
            vec!["Gender_F".to_string(), "Age".to_string()],
            CategoryVocabulary::default(),
            HyperParams::default(),
        )
    }

    #[test]
    fn test_model_creation() {
        let model = create_test_model();
        assert_eq!(model.version, MODEL_VERSION);
        assert_eq!(model.num_trees(), 2);
        assert_eq!(model.num_features(), 2);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_margin_sums_trees() {
        let model = create_test_model();
        assert!((model.base_margin()).abs() < 1e-12);
        assert!((model.margin(&[1.0, 1.0]) - 0.7).abs() < 1e-12);
        assert!((model.margin(&[0.0, 3.0]) - (-0.5)).abs() < 1e-12);
        assert!((model.predict_proba(&[0.0, 0.0]) - sigmoid(-0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_expected_margin() {
        let model = create_test_model();
        // tree1: 0.6 * -0.4 + 0.4 * 0.6 = 0; tree2: 0
        assert!(model.expected_margin().abs() < 1e-12);
    }

    #[test]
    fn test_predict_matrix_is_order_insensitive() {
        let model = create_test_model();
        let matrix = FeatureMatrix {
            names: vec!["Age".to_string(), "Gender_F".to_string()],
            rows: vec![vec![3.0, 1.0]],
        };
        let probs = model.predict_proba_matrix(&matrix).unwrap();
        assert!((probs[0] - model.predict_proba(&[1.0, 3.0])).abs() < 1e-12);
    }

    #[test]
    fn test_hash_changes_with_model() {
        let model1 = create_test_model();
        let mut model2 = create_test_model();
        model2.trees[0].nodes[1].leaf = Some(-0.5);

        let hash1 = model1.structure_hash().unwrap();
        assert_eq!(hash1, create_test_model().structure_hash().unwrap());
        assert_ne!(hash1, model2.structure_hash().unwrap());
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_save_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut model = create_test_model();
        model.refresh_hash().unwrap();
        model.save_json(&path).unwrap();

        let loaded = Model::load_json(&path).unwrap();
        assert_eq!(model, loaded);
        assert_eq!(loaded.metadata.model_hash, loaded.structure_hash().unwrap());
    }

    #[test]
    fn test_model_validation() {
        let mut invalid = create_test_model();
        invalid.base_score = 1.0;
        assert!(invalid.validate().is_err());

        let mut invalid = create_test_model();
        invalid.version = 999;
        assert!(invalid.validate().is_err());

        let mut invalid = create_test_model();
        invalid.feature_names.pop();
        assert!(matches!(
            invalid.validate(),
            Err(PipelineError::Compatibility(_))
        ));
    }
}
