//! Binary classification metrics for evaluation passes.

use candle_core::{Result, Tensor};

/// Metrics for one evaluation pass over a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub loss: f32,
    pub accuracy: f32,
    /// Per-class F1, indexed `[negative, positive]`.
    pub f1: [f32; 2],
}

impl EvalReport {
    /// Compute accuracy and per-class F1 from raw logits, using a 0.5
    /// probability threshold.
    pub fn from_logits(logits: &Tensor, labels: &[f32], loss: f32) -> Result<EvalReport> {
        let probs = candle_nn::ops::sigmoid(logits)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let (accuracy, f1) = classification_metrics(&probs, labels);
        Ok(EvalReport { loss, accuracy, f1 })
    }
}

/// Accuracy and per-class F1 at a 0.5 threshold.
///
/// Undefined precision/recall (empty denominator) counts as zero rather
/// than NaN, so reports on degenerate splits stay finite.
pub fn classification_metrics(probs: &[f32], labels: &[f32]) -> (f32, [f32; 2]) {
    debug_assert_eq!(probs.len(), labels.len());
    if probs.is_empty() {
        return (0.0, [0.0, 0.0]);
    }

    // Confusion counts per class: [true positives, predicted, actual].
    let mut counts = [[0usize; 3]; 2];
    let mut correct = 0usize;
    for (&p, &l) in probs.iter().zip(labels) {
        let pred = usize::from(p >= 0.5);
        let actual = usize::from(l >= 0.5);
        if pred == actual {
            correct += 1;
            counts[pred][0] += 1;
        }
        counts[pred][1] += 1;
        counts[actual][2] += 1;
    }

    let f1_of = |[tp, pred, actual]: [usize; 3]| -> f32 {
        let precision = if pred > 0 { tp as f32 / pred as f32 } else { 0.0 };
        let recall = if actual > 0 { tp as f32 / actual as f32 } else { 0.0 };
        if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    };

    let accuracy = correct as f32 / probs.len() as f32;
    (accuracy, [f1_of(counts[0]), f1_of(counts[1])])
}
