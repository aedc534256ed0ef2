//! Single-blob training checkpoints.
//!
//! Everything a run needs to continue lives in one bincode record: model
//! weights, optimizer moments, scheduler position, loss-scaler state, the
//! epoch counters, per-epoch histories, and the config that produced it
//! all. A checkpoint is therefore self-describing; resuming never depends
//! on side files.
//!
//! Writes go through a temp file in the same directory followed by a
//! rename, so a crash mid-save leaves the previous checkpoint intact.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use reelgraph_core::TrainConfig;

use crate::error::{Error, Result};
use crate::optim::OptimizerState;
use crate::scaler::LossScaler;
use crate::scheduler::SchedulerState;

/// A dense f32 tensor in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub dims: Vec<usize>,
    pub values: Vec<f32>,
}

impl TensorData {
    pub fn from_tensor(t: &Tensor) -> Result<Self> {
        Ok(Self {
            dims: t.dims().to_vec(),
            values: t.flatten_all()?.to_vec1::<f32>()?,
        })
    }

    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.values.clone(),
            self.dims.as_slice(),
            device,
        )?)
    }
}

/// Per-epoch histories accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    pub train_loss: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_accuracy: Vec<f32>,
    /// Per-class validation F1, `[negative, positive]`.
    pub val_f1: Vec<[f32; 2]>,
}

/// The checkpoint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config: TrainConfig,
    /// Last completed epoch (0-based).
    pub epoch: usize,
    /// Epoch the run was scheduled to stop at.
    pub end_epoch: usize,
    /// Named model parameters, sorted by name.
    pub model: Vec<(String, TensorData)>,
    pub optimizer: OptimizerState,
    pub scheduler: Option<SchedulerState>,
    pub scaler: LossScaler,
    pub history: MetricHistory,
    /// Run directory the checkpoint was written into.
    pub log_dir: PathBuf,
}

impl Checkpoint {
    /// Write the record atomically to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Checkpoint> {
        if !path.is_file() {
            return Err(Error::CheckpointNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}

/// The variables of a var map in name order.
///
/// A var map iterates in hash order; optimizer moment buffers are keyed
/// by position, so both sides of a checkpoint must walk the variables in
/// the same order.
pub fn sorted_vars(varmap: &VarMap) -> Result<Vec<candle_core::Var>> {
    let data = varmap.data().lock().map_err(|_| Error::Poisoned)?;
    let mut named: Vec<(&String, &candle_core::Var)> = data.iter().collect();
    named.sort_by(|a, b| a.0.cmp(b.0));
    Ok(named.into_iter().map(|(_, v)| v.clone()).collect())
}

/// Snapshot every named parameter in a var map, sorted by name.
pub fn export_weights(varmap: &VarMap) -> Result<Vec<(String, TensorData)>> {
    let data = varmap.data().lock().map_err(|_| Error::Poisoned)?;
    let mut out = Vec::with_capacity(data.len());
    for (name, var) in data.iter() {
        out.push((name.clone(), TensorData::from_tensor(var.as_tensor())?));
    }
    drop(data);
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Load checkpointed weights back into a var map built from the same
/// metadata. Every checkpointed name must exist with a matching shape.
pub fn import_weights(varmap: &VarMap, weights: &[(String, TensorData)]) -> Result<()> {
    let data = varmap.data().lock().map_err(|_| Error::Poisoned)?;
    for (name, tensor) in weights {
        let var = data.get(name).ok_or_else(|| {
            Error::StateMismatch(format!("checkpoint has unknown parameter {name:?}"))
        })?;
        if var.dims() != tensor.dims.as_slice() {
            return Err(Error::StateMismatch(format!(
                "parameter {name:?} has shape {:?} but the checkpoint holds {:?}",
                var.dims(),
                tensor.dims
            )));
        }
        var.set(&tensor.to_tensor(var.device())?)?;
    }
    Ok(())
}
