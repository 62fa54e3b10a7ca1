//! Gradient boosted decision tree classifier
//!
//! The model is an additive ensemble of regression trees over a logistic
//! link:
//!
//! - Each tree maps a feature row to a leaf value (learning rate applied)
//! - The margin is `logit(base_score) + Σ leaf values`
//! - The positive-class probability is `sigmoid(margin)`
//!
//! # Model Format
//!
//! Models are serialized as canonical JSON with sorted keys:
//!
//! ```json
//! {
//!   "base_score": 0.5,
//!   "feature_names": ["Gender_F", "Gender_M", "Gender__unknown"],
//!   "trees": [
//!     {
//!       "nodes": [
//!         {"id":0,"left":1,"right":2,"feature_idx":0,"threshold":0.5,"leaf":null,"cover":24.0},
//!         {"id":1,"left":-1,"right":-1,"feature_idx":-1,"threshold":0.0,"leaf":-0.12,"cover":13.5},
//!         {"id":2,"left":-1,"right":-1,"feature_idx":-1,"threshold":0.0,"leaf":0.31,"cover":10.5}
//!       ]
//!     }
//!   ],
//!   "version": 1,
//!   ...
//! }
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use absence_ai_core::gbdt::{Model, Node, Tree};
//! use absence_ai_core::{CategoryVocabulary, HyperParams};
//!
//! let tree = Tree::new(vec![
//!     Node::internal(0, 0, 0.5, 1, 2, 2.0),
//!     Node::leaf(1, -0.2, 1.0),
//!     Node::leaf(2, 0.4, 1.0),
//! ]);
//! let model = Model::new(
//!     vec![tree],
//!     0.5,
//!     vec!["Gender_F".to_string()],
//!     CategoryVocabulary::default(),
//!     HyperParams::default(),
//! );
//!
//! let p = model.predict_proba(&[1.0]);
//! let hash = model.structure_hash().unwrap();
//! ```

pub mod model;
pub mod tree;

// Re-export main types for convenience
pub use model::{sigmoid, Model, ModelMetadata, MODEL_VERSION};
pub use tree::{Node, Tree};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::config::HyperParams;
    use crate::features::CategoryVocabulary;

    fn two_tree_model() -> Model {
        let tree1 = Tree::new(vec![
            Node::internal(0, 0, 50.0, 1, 2, 8.0),
            Node::leaf(1, 1.0, 4.0),
            Node::leaf(2, 2.0, 4.0),
        ]);
        let tree2 = Tree::new(vec![
            Node::internal(0, 1, 30.0, 1, 2, 8.0),
            Node::leaf(1, -0.5, 2.0),
            Node::leaf(2, 0.5, 6.0),
        ]);
        Model::new(
            vec![tree1, tree2],
            0.5,
            vec!["a".to_string(), "b".to_string()],
            CategoryVocabulary::default(),
            HyperParams::default(),
        )
    }

    #[test]
    fn test_two_tree_model_inference() {
        let model = two_tree_model();

        // Tree1: 30 <= 50 -> 1.0; Tree2: 20 <= 30 -> -0.5
        assert!((model.margin(&[30.0, 20.0]) - 0.5).abs() < 1e-12);

        // Tree1: 60 > 50 -> 2.0; Tree2: 40 > 30 -> 0.5
        assert!((model.margin(&[60.0, 40.0]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_canonical_json_roundtrip() {
        let original = two_tree_model();
        let json = original.to_canonical_json().unwrap();
        assert!(!json.contains('\n'));

        let restored: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(original, restored);
        assert_eq!(
            original.structure_hash().unwrap(),
            restored.structure_hash().unwrap()
        );
    }

    #[test]
    fn test_deterministic_inference_repeated() {
        let model = two_tree_model();
        let first = model.margin(&[30.0, 40.0]);
        assert!((0..100).all(|_| model.margin(&[30.0, 40.0]) == first));
    }
}
