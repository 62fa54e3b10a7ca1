//! Decision tree structures for the boosted classifier
//!
//! Nodes live in a flat vector with node 0 as the root. Every node records
//! its cover (sum of training hessians that reached it), which the TreeSHAP
//! explainer uses to weight the branch not taken.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature_idx >= 0`, `left`/`right` index the children
/// and `leaf` is `None`. Leaves have `feature_idx == -1` and carry their
/// margin contribution in `leaf`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Rows with `value <= threshold` (or a missing value) go left
    pub threshold: f64,

    /// Leaf value, already scaled by the learning rate
    pub leaf: Option<f64>,

    /// Sum of hessians of the training rows reaching this node
    pub cover: f64,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(
        id: i32,
        feature_idx: i32,
        threshold: f64,
        left: i32,
        right: i32,
        cover: f64,
    ) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
            cover,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64, cover: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
            cover,
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }

    /// Child index a row with `features` follows from this internal node.
    ///
    /// NaN fails the `>` test and therefore goes left.
    pub fn next(&self, features: &[f64]) -> usize {
        let value = features
            .get(self.feature_idx as usize)
            .copied()
            .unwrap_or(f64::NAN);
        if value > self.threshold {
            self.right as usize
        } else {
            self.left as usize
        }
    }
}

/// A single regression tree of the ensemble
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on a feature vector, returning the leaf value
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0; // Invalid tree structure
            };
            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }
            idx = node.next(features);
        }
    }

    /// Cover-weighted mean leaf value, i.e. the tree's output when no
    /// feature is known
    pub fn expected_value(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.expected_from(0)
    }

    fn expected_from(&self, idx: usize) -> f64 {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return node.leaf.unwrap_or(0.0);
        }
        let (left_share, right_share) = self.child_shares(idx);
        left_share * self.expected_from(node.left as usize)
            + right_share * self.expected_from(node.right as usize)
    }

    /// Fractions of an internal node's cover going left and right.
    ///
    /// A node without cover splits evenly.
    pub fn child_shares(&self, idx: usize) -> (f64, f64) {
        let node = &self.nodes[idx];
        let left = self.nodes[node.left as usize].cover;
        let right = self.nodes[node.right as usize].cover;
        let total = left + right;
        if total > 0.0 {
            (left / total, right / total)
        } else {
            (0.5, 0.5)
        }
    }

    /// Maximum depth (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(tree: &Tree, idx: usize) -> usize {
            let node = &tree.nodes[idx];
            if node.is_leaf() {
                0
            } else {
                1 + walk(tree, node.left as usize).max(walk(tree, node.right as usize))
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(self, 0)
        }
    }

    /// Get the root node
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Validate tree structure against the model's feature count
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(v) if v.is_finite() => {}
                    _ => return Err(format!("Leaf {} has no finite value", i)),
                }
                continue;
            }

            // Children always follow their parent in the flat layout, which
            // also rules out cycles
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {} has invalid child: {}", i, child));
                }
            }
            if node.feature_idx < 0 || node.feature_idx as usize >= feature_count {
                return Err(format!(
                    "Node {} splits on unknown feature {}",
                    i, node.feature_idx
                ));
            }
            if !node.threshold.is_finite() {
                return Err(format!("Node {} has a non-finite threshold", i));
            }
        }

        Ok(())
    }
}
