//! Serializable optimizers over candle variables.
//!
//! The moment buffers live here as plain tensors so the full optimizer
//! state can travel inside a checkpoint and training resumes bit-for-bit
//! where it left off.
//!
//! `step` takes a `grad_scale` multiplier applied to every gradient before
//! the update. The trainer folds two things into it: the global-norm clip
//! factor and the inverse loss scale, so gradients are never rewritten in
//! place.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use serde::{Deserialize, Serialize};

use reelgraph_core::{AdamWParams, OptimizerConfig, SgdParams};

use crate::checkpoint::TensorData;
use crate::error::{Error, Result};

/// Gradient-norm ceiling applied on every training step.
pub const MAX_GRAD_NORM: f64 = 10.0;

/// L2 norm of all gradients taken together.
pub fn global_grad_norm(vars: &[Var], grads: &GradStore) -> Result<f64> {
    let mut total = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var) {
            total += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    Ok(total.sqrt())
}

/// Multiplier that brings a gradient norm down to [`MAX_GRAD_NORM`].
/// Returns 1.0 when the norm is already within the ceiling.
pub fn clip_factor(norm: f64) -> f64 {
    if norm > MAX_GRAD_NORM {
        MAX_GRAD_NORM / (norm + 1e-6)
    } else {
        1.0
    }
}

/// Optimizer state as stored in a checkpoint. Buffers are ordered like the
/// optimizer's variable list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptimizerState {
    AdamW {
        step: usize,
        m: Vec<TensorData>,
        v: Vec<TensorData>,
    },
    Sgd {
        momentum: Vec<TensorData>,
    },
}

/// The configured optimizer. Variable order is fixed at construction and
/// must match between a checkpoint's producer and consumer, which holds
/// as long as both build the model the same way.
pub enum Optim {
    AdamW(AdamW),
    Sgd(Sgd),
}

impl Optim {
    pub fn new(vars: Vec<Var>, config: &OptimizerConfig) -> Result<Self> {
        Ok(match config {
            OptimizerConfig::AdamW(p) => Optim::AdamW(AdamW::new(vars, p.clone())?),
            OptimizerConfig::Sgd(p) => Optim::Sgd(Sgd::new(vars, p.clone())?),
        })
    }

    pub fn step(&mut self, grads: &GradStore, grad_scale: f64) -> Result<()> {
        match self {
            Optim::AdamW(o) => o.step(grads, grad_scale),
            Optim::Sgd(o) => o.step(grads, grad_scale),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Optim::AdamW(o) => o.params.lr,
            Optim::Sgd(o) => o.params.lr,
        }
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Optim::AdamW(o) => o.params.lr = lr,
            Optim::Sgd(o) => o.params.lr = lr,
        }
    }

    pub fn state(&self) -> Result<OptimizerState> {
        match self {
            Optim::AdamW(o) => o.state(),
            Optim::Sgd(o) => o.state(),
        }
    }

    pub fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        match (self, state) {
            (Optim::AdamW(o), OptimizerState::AdamW { step, m, v }) => o.load_state(*step, m, v),
            (Optim::Sgd(o), OptimizerState::Sgd { momentum }) => o.load_state(momentum),
            _ => Err(Error::StateMismatch(
                "optimizer kind differs from the checkpointed one".into(),
            )),
        }
    }
}

fn zeros_like_all(vars: &[Var]) -> Result<Vec<Tensor>> {
    vars.iter().map(|v| Ok(v.zeros_like()?)).collect()
}

fn restore_buffers(vars: &[Var], data: &[TensorData], which: &str) -> Result<Vec<Tensor>> {
    if data.len() != vars.len() {
        return Err(Error::StateMismatch(format!(
            "{which} buffer count {} does not match {} variables",
            data.len(),
            vars.len()
        )));
    }
    vars.iter()
        .zip(data)
        .map(|(var, d)| {
            if d.dims != var.dims() {
                return Err(Error::StateMismatch(format!(
                    "{which} buffer shape {:?} does not match variable shape {:?}",
                    d.dims,
                    var.dims()
                )));
            }
            d.to_tensor(var.device())
        })
        .collect()
}

/// AdamW with decoupled weight decay (Loshchilov & Hutter, 2019).
pub struct AdamW {
    vars: Vec<Var>,
    params: AdamWParams,
    step: usize,
    m: Vec<Tensor>,
    v: Vec<Tensor>,
}

impl AdamW {
    pub fn new(vars: Vec<Var>, params: AdamWParams) -> Result<Self> {
        let m = zeros_like_all(&vars)?;
        let v = zeros_like_all(&vars)?;
        Ok(Self {
            vars,
            params,
            step: 0,
            m,
            v,
        })
    }

    pub fn step(&mut self, grads: &GradStore, grad_scale: f64) -> Result<()> {
        self.step += 1;
        let t = self.step as i32;
        let p = &self.params;
        let bias1 = 1.0 - p.beta1.powi(t);
        let bias2 = 1.0 - p.beta2.powi(t);

        for (i, var) in self.vars.iter().enumerate() {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let grad = (grad * grad_scale)?;
            let next_m = ((&self.m[i] * p.beta1)? + (&grad * (1.0 - p.beta1))?)?;
            let next_v = ((&self.v[i] * p.beta2)? + (grad.sqr()? * (1.0 - p.beta2))?)?;
            let m_hat = (&next_m / bias1)?;
            let v_hat = (&next_v / bias2)?;
            let update = (m_hat / (v_hat.sqrt()? + p.eps)?)?;
            let next = ((var.as_tensor() * (1.0 - p.lr * p.weight_decay))? - (update * p.lr)?)?;
            var.set(&next)?;
            self.m[i] = next_m;
            self.v[i] = next_v;
        }
        Ok(())
    }

    fn state(&self) -> Result<OptimizerState> {
        Ok(OptimizerState::AdamW {
            step: self.step,
            m: self.m.iter().map(TensorData::from_tensor).collect::<Result<_>>()?,
            v: self.v.iter().map(TensorData::from_tensor).collect::<Result<_>>()?,
        })
    }

    fn load_state(&mut self, step: usize, m: &[TensorData], v: &[TensorData]) -> Result<()> {
        self.m = restore_buffers(&self.vars, m, "first-moment")?;
        self.v = restore_buffers(&self.vars, v, "second-moment")?;
        self.step = step;
        Ok(())
    }
}

/// Plain SGD with optional momentum.
pub struct Sgd {
    vars: Vec<Var>,
    params: SgdParams,
    momentum: Vec<Tensor>,
}

impl Sgd {
    pub fn new(vars: Vec<Var>, params: SgdParams) -> Result<Self> {
        let momentum = zeros_like_all(&vars)?;
        Ok(Self {
            vars,
            params,
            momentum,
        })
    }

    pub fn step(&mut self, grads: &GradStore, grad_scale: f64) -> Result<()> {
        for (i, var) in self.vars.iter().enumerate() {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let grad = (grad * grad_scale)?;
            let buf = if self.params.momentum != 0.0 {
                let next = ((&self.momentum[i] * self.params.momentum)? + &grad)?;
                self.momentum[i] = next.clone();
                next
            } else {
                grad
            };
            let next = (var.as_tensor() - (buf * self.params.lr)?)?;
            var.set(&next)?;
        }
        Ok(())
    }

    fn state(&self) -> Result<OptimizerState> {
        Ok(OptimizerState::Sgd {
            momentum: self
                .momentum
                .iter()
                .map(TensorData::from_tensor)
                .collect::<Result<_>>()?,
        })
    }

    fn load_state(&mut self, momentum: &[TensorData]) -> Result<()> {
        self.momentum = restore_buffers(&self.vars, momentum, "momentum")?;
        Ok(())
    }
}
