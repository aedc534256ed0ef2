//! Error types for training and checkpointing.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("data error: {0}")]
    Core(#[from] reelgraph_core::Error),

    #[error("checkpoint codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("scalar stream error: {0}")]
    Scalars(#[from] serde_json::Error),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    #[error("checkpoint does not match the model: {0}")]
    StateMismatch(String),

    #[error("plot rendering failed: {0}")]
    Plot(String),

    #[error("parameter store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
