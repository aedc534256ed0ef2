//! Dynamic loss scaling for mixed-precision-style training.
//!
//! The loss is multiplied by a scale before backward so small gradients
//! survive reduced precision; the optimizer then divides the gradients
//! back down. When scaled gradients overflow to inf/NaN the step is
//! skipped and the scale halves; after a long enough run of clean steps
//! the scale doubles again.
//!
//! Disabled, the scaler is the identity: scale 1.0 and no skipped steps.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const INITIAL_SCALE: f64 = 65536.0;
const GROWTH_FACTOR: f64 = 2.0;
const BACKOFF_FACTOR: f64 = 0.5;
const GROWTH_INTERVAL: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossScaler {
    enabled: bool,
    scale: f64,
    good_steps: usize,
}

impl LossScaler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            scale: if enabled { INITIAL_SCALE } else { 1.0 },
            good_steps: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Multiplier the optimizer applies to undo the scaling.
    pub fn inv_scale(&self) -> f64 {
        1.0 / self.scale
    }

    pub fn scale_loss(&self, loss: &Tensor) -> Result<Tensor> {
        if self.enabled {
            Ok((loss * self.scale)?)
        } else {
            Ok(loss.clone())
        }
    }

    /// Record the outcome of one step. Returns `true` when the step must
    /// be skipped because the gradients were not finite.
    pub fn update(&mut self, found_non_finite: bool) -> bool {
        if !self.enabled {
            return found_non_finite;
        }
        if found_non_finite {
            self.scale *= BACKOFF_FACTOR;
            self.good_steps = 0;
            return true;
        }
        self.good_steps += 1;
        if self.good_steps >= GROWTH_INTERVAL {
            self.scale *= GROWTH_FACTOR;
            self.good_steps = 0;
        }
        false
    }
}
