//! Run-level setup: device, seeding, run directories.

use std::path::{Path, PathBuf};

use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;

/// Device and RNG state for one training run.
///
/// Construction is the single place randomness gets seeded: the device's
/// kernel RNG (embedding init) and the host RNG (splits, shuffling) both
/// derive from the same seed, so a run is reproducible end to end.
pub struct RunContext {
    pub device: Device,
    pub rng: StdRng,
    pub seed: u64,
}

impl RunContext {
    pub fn new(seed: u64) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        device.set_seed(seed)?;
        Ok(Self {
            device,
            rng: StdRng::seed_from_u64(seed),
            seed,
        })
    }
}

/// Create the next numbered run directory under `logdir`.
///
/// Runs are named `train_<n>` where `n` is the number of entries already
/// present, so successive runs land in `train_0`, `train_1`, ...
pub fn create_run_dir(logdir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(logdir)?;
    let n = std::fs::read_dir(logdir)?.count();
    let run_dir = logdir.join(format!("train_{n}"));
    std::fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}
