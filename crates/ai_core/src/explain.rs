//! TreeSHAP feature attribution
//!
//! Exact Shapley values for tree ensembles in polynomial time, following the
//! path-dependent algorithm of Lundberg et al. ("Consistent Individualized
//! Feature Attribution for Tree Ensembles"). The branch a row does not take
//! is weighted by the training cover stored in each node.
//!
//! Values are in margin (log-odds) space and satisfy local accuracy:
//! `expected_value + Σ phi == model.margin(row)`.

use crate::errors::{PipelineError, Result};
use crate::features::FeatureMatrix;
use crate::gbdt::{Model, Tree};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// Default length of the attribution ranking
pub const DEFAULT_TOP_K: usize = 10;

/// One feature of the ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub feature: String,
    /// Mean absolute SHAP value across rows
    pub score: f64,
}

/// Per-row, per-feature SHAP values
#[derive(Debug, Clone)]
pub struct ShapValues {
    pub feature_names: Vec<String>,
    /// `values[row][feature]`
    pub values: Vec<Vec<f64>>,
    /// Model margin when no feature is known
    pub expected_value: f64,
}

impl ShapValues {
    /// Mean absolute value of every feature column
    pub fn mean_abs(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.feature_names.len()];
        for row in &self.values {
            for (sum, v) in sums.iter_mut().zip(row) {
                *sum += v.abs();
            }
        }
        let n = self.values.len().max(1) as f64;
        sums.into_iter().map(|s| s / n).collect()
    }

    /// Features by descending mean |SHAP|, ties by name, truncated to `k`
    pub fn ranking(&self, k: usize) -> Vec<Attribution> {
        let mut ranked: Vec<Attribution> = self
            .feature_names
            .iter()
            .zip(self.mean_abs())
            .map(|(feature, score)| Attribution {
                feature: feature.clone(),
                score,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        ranked.truncate(k);
        ranked
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature_index: i32,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Computes SHAP values for a fitted model
pub struct TreeExplainer<'a> {
    model: &'a Model,
}

impl<'a> TreeExplainer<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    pub fn expected_value(&self) -> f64 {
        self.model.expected_margin()
    }

    /// SHAP values for every row of `matrix`.
    ///
    /// Columns may come in any order but must be exactly the model's
    /// feature set; anything else is a compatibility error.
    pub fn shap_values(&self, matrix: &FeatureMatrix) -> Result<ShapValues> {
        let aligned = matrix.aligned_to(&self.model.feature_names)?;

        let values = aligned
            .rows
            .iter()
            .map(|row| self.row_values(row))
            .collect();

        Ok(ShapValues {
            feature_names: aligned.names,
            values,
            expected_value: self.expected_value(),
        })
    }

    /// SHAP values for a single row in model feature order
    pub fn row_values(&self, row: &[f64]) -> Vec<f64> {
        let mut phi = vec![0.0; self.model.num_features()];
        for tree in &self.model.trees {
            if tree.nodes.is_empty() {
                continue;
            }
            tree_shap(tree, 0, row, &mut phi, &[], 1.0, 1.0, -1);
        }
        phi
    }
}

/// Rank the model's features by mean |SHAP| over `matrix`, keeping `top_k`.
pub fn explain(model: &Model, matrix: &FeatureMatrix, top_k: usize) -> Result<Vec<Attribution>> {
    if matrix.is_empty() {
        return Err(PipelineError::Schema("no rows to explain".to_string()));
    }
    let shap = TreeExplainer::new(model).shap_values(matrix)?;
    let ranking = shap.ranking(top_k);
    debug!(
        rows = matrix.len(),
        features = shap.feature_names.len(),
        expected_value = shap.expected_value,
        "Computed SHAP values"
    );
    Ok(ranking)
}

#[allow(clippy::too_many_arguments)]
fn tree_shap(
    tree: &Tree,
    node_idx: usize,
    row: &[f64],
    phi: &mut [f64],
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature_index: i32,
) {
    let mut path = Vec::with_capacity(parent_path.len() + 1);
    path.extend_from_slice(parent_path);
    extend_path(&mut path, zero_fraction, one_fraction, feature_index);

    let node = &tree.nodes[node_idx];
    if node.is_leaf() {
        let leaf = node.leaf.unwrap_or(0.0);
        for i in 1..path.len() {
            let weight = unwound_path_sum(&path, i);
            let element = path[i];
            phi[element.feature_index as usize] +=
                weight * (element.one_fraction - element.zero_fraction) * leaf;
        }
        return;
    }

    let left = node.left as usize;
    let right = node.right as usize;
    let hot = node.next(row);
    let cold = if hot == left { right } else { left };

    let (left_share, right_share) = tree.child_shares(node_idx);
    let (hot_share, cold_share) = if hot == left {
        (left_share, right_share)
    } else {
        (right_share, left_share)
    };

    // A feature split on again below is unwound so it appears once per path
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(k) = path.iter().position(|e| e.feature_index == node.feature_idx) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind_path(&mut path, k);
    }

    tree_shap(
        tree,
        hot,
        row,
        phi,
        &path,
        hot_share * incoming_zero,
        incoming_one,
        node.feature_idx,
    );
    tree_shap(
        tree,
        cold,
        row,
        phi,
        &path,
        cold_share * incoming_zero,
        0.0,
        node.feature_idx,
    );
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature_index: i32) {
    let depth = path.len();
    path.push(PathElement {
        feature_index,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let scale = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / scale;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / scale;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, path_index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * scale / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (depth - i) as f64 / scale;
        } else if zero_fraction != 0.0 {
            path[i].pweight = path[i].pweight * scale / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in path_index..depth {
        path[i].feature_index = path[i + 1].feature_index;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], path_index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next_one_portion / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (depth - i) as f64;
        }
    } else if zero_fraction != 0.0 {
        for i in (0..depth).rev() {
            total += path[i].pweight / (zero_fraction * (depth - i) as f64);
        }
    }

    total * (depth + 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HyperParams;
    use crate::features::CategoryVocabulary;
    use crate::gbdt::Node;

    fn model(trees: Vec<Tree>, names: &[&str]) -> Model {
        Model::new(
            trees,
            0.5,
            names.iter().map(|s| s.to_string()).collect(),
            CategoryVocabulary::default(),
            HyperParams::default(),
        )
    }

    /// Depth-2 tree splitting on feature 0 then feature 1 (right) and
    /// feature 0 again (left)
    fn nested_tree() -> Tree {
        Tree::new(vec![
            Node::internal(0, 0, 0.5, 1, 4, 10.0),
            Node::internal(1, 0, 0.25, 2, 3, 6.0),
            Node::leaf(2, -1.0, 2.0),
            Node::leaf(3, -0.5, 4.0),
            Node::internal(4, 1, 3.0, 5, 6, 4.0),
            Node::leaf(5, 0.5, 1.0),
            Node::leaf(6, 1.5, 3.0),
        ])
    }

    #[test]
    fn test_single_split_attribution() {
        let tree = Tree::new(vec![
            Node::internal(0, 0, 0.5, 1, 2, 4.0),
            Node::leaf(1, -1.0, 2.0),
            Node::leaf(2, 1.0, 2.0),
        ]);
        let m = model(vec![tree], &["x", "unused"]);
        let phi = TreeExplainer::new(&m).row_values(&[1.0, 7.0]);

        // E[f] = 0, f(x) = 1, so all credit goes to x
        assert!((phi[0] - 1.0).abs() < 1e-12);
        assert_eq!(phi[1], 0.0);
    }

    #[test]
    fn test_local_accuracy() {
        let m = model(
            vec![nested_tree(), nested_tree(), Tree::new(vec![Node::leaf(0, 0.3, 10.0)])],
            &["a", "b", "c"],
        );
        let explainer = TreeExplainer::new(&m);

        for row in [
            [0.1, 2.0, 0.0],
            [0.3, 5.0, 1.0],
            [0.9, 2.0, 1.0],
            [0.9, 9.0, 0.0],
            [f64::NAN, 9.0, 0.0],
        ] {
            let phi = explainer.row_values(&row);
            let total: f64 = phi.iter().sum::<f64>() + explainer.expected_value();
            assert!(
                (total - m.margin(&row)).abs() < 1e-9,
                "row {:?}: {} vs {}",
                row,
                total,
                m.margin(&row)
            );
            assert_eq!(phi[2], 0.0);
        }
    }

    #[test]
    fn test_ranking_sorted_and_truncated() {
        let shap = ShapValues {
            feature_names: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            values: vec![vec![0.1, -0.4, 0.2, 0.2], vec![-0.1, 0.2, -0.2, 0.2]],
            expected_value: 0.0,
        };
        let ranking = shap.ranking(3);
        let names: Vec<&str> = ranking.iter().map(|a| a.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert!((ranking[0].score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_explain_rejects_mismatched_columns() {
        let m = model(vec![nested_tree()], &["a", "b"]);
        let matrix = FeatureMatrix {
            names: vec!["a".into(), "z".into()],
            rows: vec![vec![0.0, 0.0]],
        };
        assert!(matches!(
            explain(&m, &matrix, DEFAULT_TOP_K),
            Err(PipelineError::Compatibility(_))
        ));
    }

    #[test]
    fn test_explain_empty_matrix() {
        let m = model(vec![nested_tree()], &["a", "b"]);
        let matrix = FeatureMatrix {
            names: vec!["a".into(), "b".into()],
            rows: vec![],
        };
        assert!(explain(&m, &matrix, DEFAULT_TOP_K).is_err());
    }
}
