//! Data model and dataset pipeline for bipartite movie recommendation.
//!
//! This crate owns everything up to the tensor boundary: the typed
//! heterogeneous graph, CSV ingestion of a MovieLens-style rating table,
//! seeded train/val/test splits over the supervised edges, minibatch
//! iteration, and the YAML run configuration.
//!
//! The model and training crates consume [`RecDataset`] and [`RecBatch`];
//! nothing here depends on a tensor backend.

mod batch;
mod config;
mod dataset;
mod error;
mod graph;
mod ratings;

pub use batch::{BatchIter, RecBatch};
pub use config::{
    AdamWParams, DataConfig, ModelConfig, OptimizerConfig, SchedulerConfig, SgdParams,
    TrainConfig, TrainSection,
};
pub use dataset::{RecDataset, SupervisedSplit};
pub use error::{Error, Result};
pub use graph::{EdgeIndex, EdgeStore, HeteroGraph, Metadata, NodeType, Relation};
pub use ratings::{min_max_scale, IdMap, RatingTable};
