//! CART (Classification and Regression Tree) builder
//!
//! Implements deterministic exact-greedy regression tree construction on
//! second-order gradient statistics, as used by Newton boosting.

use absence_ai_core::gbdt::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum hessian sum in each child of a split
    pub min_child_weight: f64,
    /// L2 penalty on leaf values
    pub reg_lambda: f64,
    /// Minimum loss reduction to keep a split
    pub gamma: f64,
    /// Shrinkage applied to every leaf value
    pub learning_rate: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            learning_rate: 0.1,
        }
    }
}

/// Sample with features, gradient, and hessian
#[derive(Clone, Debug)]
struct Sample<'a> {
    features: &'a [f64],
    gradient: f64,
    hessian: f64,
}

/// Split candidate with gain
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Gradient and hessian totals of a sample set
#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    g: f64,
    h: f64,
}

impl GradStats {
    fn add(&mut self, sample: &Sample<'_>) {
        self.g += sample.gradient;
        self.h += sample.hessian;
    }

    fn minus(self, other: GradStats) -> GradStats {
        GradStats {
            g: self.g - other.g,
            h: self.h - other.h,
        }
    }

    /// Structure score `G² / (H + λ)`
    fn score(self, lambda: f64) -> f64 {
        let denom = self.h + lambda;
        if denom > 0.0 {
            self.g * self.g / denom
        } else {
            0.0
        }
    }
}

/// Build a regression tree using exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    config: TreeConfig,
    samples: Vec<Sample<'a>>,
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    /// `features`, `gradients` and `hessians` are parallel slices, one entry
    /// per training row
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &[f64],
        hessians: &[f64],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());

        let samples: Vec<Sample<'a>> = features
            .iter()
            .zip(gradients.iter().zip(hessians.iter()))
            .map(|(f, (&g, &h))| Sample {
                features: f.as_slice(),
                gradient: g,
                hessian: h,
            })
            .collect();

        let feature_count = samples.first().map_or(0, |s| s.features.len());

        Self {
            config,
            samples,
            feature_count,
        }
    }

    /// Build tree and return nodes
    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.samples.len()).collect();

        self.build_node(&indices, 0, &mut nodes);

        Tree::new(nodes)
    }

    /// Recursively build tree nodes in pre-order; returns the node index
    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        let current_idx = nodes.len() as i32;
        let stats = self.sum_gradients_hessians(indices);

        let split = if depth < self.config.max_depth {
            self.find_best_split(indices, stats)
        } else {
            None
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(current_idx, self.leaf_value(stats), stats.h));
            return current_idx;
        };

        // Reserve space for current node
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
            stats.h,
        ));

        let (left_indices, right_indices) =
            self.split_samples(indices, split.feature_idx, split.threshold);

        let left_idx = self.build_node(&left_indices, depth + 1, nodes);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes);

        let node = &mut nodes[current_idx as usize];
        node.left = left_idx;
        node.right = right_idx;

        current_idx
    }

    /// Find best split using exact-greedy algorithm.
    ///
    /// Candidates are visited in (feature, threshold) order and only a
    /// strictly larger gain replaces the incumbent, so ties go to the
    /// lowest feature index, then the lowest threshold.
    fn find_best_split(&self, indices: &[usize], parent: GradStats) -> Option<SplitCandidate> {
        let lambda = self.config.reg_lambda;
        let parent_score = parent.score(lambda);
        let mut best_split: Option<SplitCandidate> = None;

        for feature_idx in 0..self.feature_count {
            let mut missing = GradStats::default();
            let mut present: Vec<(f64, usize)> = Vec::with_capacity(indices.len());
            for &idx in indices {
                let value = self.samples[idx].features[feature_idx];
                if value.is_nan() {
                    missing.add(&self.samples[idx]);
                } else {
                    present.push((value, idx));
                }
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            // Missing values always go left
            let mut left = missing;
            for pos in 0..present.len() {
                let (value, idx) = present[pos];
                left.add(&self.samples[idx]);

                let Some(&(next_value, _)) = present.get(pos + 1) else {
                    break;
                };
                if next_value <= value {
                    continue;
                }

                let right = parent.minus(left);
                if left.h < self.config.min_child_weight || right.h < self.config.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (left.score(lambda) + right.score(lambda) - parent_score)
                    - self.config.gamma;
                if gain <= 0.0 {
                    continue;
                }

                if best_split.as_ref().map_or(true, |current| gain > current.gain) {
                    best_split = Some(SplitCandidate {
                        feature_idx,
                        threshold: midpoint(value, next_value),
                        gain,
                    });
                }
            }
        }

        best_split
    }

    /// Split samples based on threshold; NaN goes left
    fn split_samples(
        &self,
        indices: &[usize],
        feature_idx: usize,
        threshold: f64,
    ) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .partition(|&&idx| !(self.samples[idx].features[feature_idx] > threshold))
    }

    /// Sum gradients and hessians for a set of samples
    fn sum_gradients_hessians(&self, indices: &[usize]) -> GradStats {
        let mut stats = GradStats::default();
        for &idx in indices {
            stats.add(&self.samples[idx]);
        }
        stats
    }

    /// Optimal leaf value `-G / (H + λ)`, shrunk by the learning rate
    fn leaf_value(&self, stats: GradStats) -> f64 {
        let denom = stats.h + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -stats.g / denom * self.config.learning_rate
    }
}

/// Threshold between two consecutive distinct values that keeps `lower`
/// on the left and `upper` on the right
fn midpoint(lower: f64, upper: f64) -> f64 {
    let mid = lower + (upper - lower) / 2.0;
    if mid < upper {
        mid
    } else {
        lower
    }
}
