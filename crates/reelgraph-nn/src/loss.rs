//! Training loss.

use candle_core::{Result, Tensor};

/// Mean binary cross-entropy over raw logits.
///
/// The sigmoid is applied internally, so callers pass the model's
/// unnormalized scores directly.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    candle_nn::loss::binary_cross_entropy_with_logit(logits, targets)
}
