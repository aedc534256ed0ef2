//! Training infrastructure for the reelgraph recommender.
//!
//! The pieces compose around [`Trainer`]: serializable optimizers with
//! global-norm gradient clipping, epoch learning-rate schedules, dynamic
//! loss scaling, single-blob resumable checkpoints, a JSONL scalar
//! stream, and loss-curve plotting.

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod optim;
pub mod plot;
pub mod scaler;
pub mod scalars;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{Checkpoint, MetricHistory, TensorData};
pub use context::{create_run_dir, RunContext};
pub use error::{Error, Result};
pub use optim::{clip_factor, global_grad_norm, Optim, OptimizerState, MAX_GRAD_NORM};
pub use plot::{save_loss_plot, PLOT_FILE};
pub use scaler::LossScaler;
pub use scalars::{ScalarWriter, SCALARS_FILE};
pub use scheduler::{LrScheduler, SchedulerState};
pub use trainer::{EvalSplit, Trainer, BEST_CHECKPOINT, LAST_CHECKPOINT};
