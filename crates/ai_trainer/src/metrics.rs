//! Held-out classification metrics

use serde::Serialize;
use std::collections::BTreeMap;

/// Probability at which a row is predicted absent
pub const DECISION_THRESHOLD: f64 = 0.5;

const EPS: f64 = 1e-15;

/// Confusion-matrix summary of a binary classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub log_loss: f64,
    pub support: usize,
}

impl ClassificationMetrics {
    /// Score probabilities against 0/1 labels.
    ///
    /// Precision and recall are 0 when their denominator is 0; F1 likewise.
    pub fn compute(labels: &[u8], probabilities: &[f64]) -> Self {
        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&label, &p) in labels.iter().zip(probabilities) {
            match (label == 1, p >= DECISION_THRESHOLD) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(tp + tn, labels.len()),
            precision,
            recall,
            f1,
            log_loss: log_loss(labels, probabilities),
            support: labels.len(),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1".to_string(), self.f1),
            ("log_loss".to_string(), self.log_loss),
        ])
    }
}

/// Mean binary cross-entropy with probabilities clipped away from 0 and 1
pub fn log_loss(labels: &[u8], probabilities: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}
