//! Run configuration.
//!
//! Loaded from a YAML document; every section is a plain serde struct.
//! Optimizer and scheduler choices are closed enums with explicit parameter
//! structs rather than dotted-path constructor references, so an
//! unsupported `type` is a parse error at startup instead of a reflection
//! failure mid-run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::NodeType;

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub train: TrainSection,
    /// Base directory for run logs; each run gets `<logdir>/train_<N>`.
    pub logdir: PathBuf,
}

impl TrainConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let config: TrainConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let d = &self.data;
        if d.val_ratio + d.test_ratio >= 1.0 {
            return Err(Error::InvalidSplit {
                val: d.val_ratio,
                test: d.test_ratio,
            });
        }
        if d.batch_size == 0 {
            return Err(Error::Dataset("data.batch_size must be > 0".into()));
        }
        if self.model.num_dim == 0 {
            return Err(Error::Dataset("model.num_dim must be > 0".into()));
        }
        Ok(())
    }
}

/// Dataset construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub ratings: PathBuf,
    #[serde(default)]
    pub movies: Option<PathBuf>,
    pub batch_size: usize,
    #[serde(default = "default_val_ratio")]
    pub val_ratio: f32,
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f32,
    #[serde(default = "default_binarize_threshold")]
    pub binarize_threshold: f32,
    #[serde(default)]
    pub seed: u64,
}

fn default_val_ratio() -> f32 {
    0.1
}

fn default_test_ratio() -> f32 {
    0.1
}

fn default_binarize_threshold() -> f32 {
    3.5
}

/// Model hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Embedding dimension.
    pub num_dim: usize,
    /// Node types that get no learned embedding table.
    #[serde(default = "default_exclude_nodes")]
    pub exclude_nodes: Vec<NodeType>,
}

fn default_exclude_nodes() -> Vec<NodeType> {
    vec![NodeType::Genre]
}

/// Training schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSection {
    pub epochs: usize,
    /// Enable loss-scaled reduced-precision stepping.
    #[serde(default)]
    pub amp: bool,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

/// Supported optimizers. Closed enumeration; see module docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum OptimizerConfig {
    AdamW(AdamWParams),
    Sgd(SgdParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamWParams {
    pub lr: f64,
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-8
}

fn default_weight_decay() -> f64 {
    0.01
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgdParams {
    pub lr: f64,
    #[serde(default)]
    pub momentum: f64,
}

/// Supported learning-rate schedules. Closed enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum SchedulerConfig {
    /// Multiply the learning rate by `gamma` every `step_size` epochs.
    Step { step_size: usize, gamma: f64 },
    /// Multiply the learning rate by `gamma` every epoch.
    Exponential { gamma: f64 },
}

impl OptimizerConfig {
    /// The configured base learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            OptimizerConfig::AdamW(p) => p.lr,
            OptimizerConfig::Sgd(p) => p.lr,
        }
    }
}
