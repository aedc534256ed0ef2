//! Epoch-based learning-rate schedules.

use serde::{Deserialize, Serialize};

use reelgraph_core::SchedulerConfig;

use crate::optim::Optim;

/// Scheduler position as stored in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub last_epoch: usize,
}

/// Decays an optimizer's learning rate once per epoch.
///
/// The schedule is a pure function of the epoch index, so restoring
/// `last_epoch` from a checkpoint reproduces the exact rate sequence.
pub struct LrScheduler {
    config: SchedulerConfig,
    base_lr: f64,
    last_epoch: usize,
}

impl LrScheduler {
    pub fn new(config: SchedulerConfig, base_lr: f64) -> Self {
        Self {
            config,
            base_lr,
            last_epoch: 0,
        }
    }

    /// The rate in effect at a given epoch.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        match self.config {
            SchedulerConfig::Step { step_size, gamma } => {
                self.base_lr * gamma.powi((epoch / step_size) as i32)
            }
            SchedulerConfig::Exponential { gamma } => self.base_lr * gamma.powi(epoch as i32),
        }
    }

    /// Advance one epoch and push the new rate into the optimizer.
    pub fn step(&mut self, optim: &mut Optim) {
        self.last_epoch += 1;
        optim.set_learning_rate(self.lr_at(self.last_epoch));
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            last_epoch: self.last_epoch,
        }
    }

    /// Restore the position and re-apply the rate it implies.
    pub fn load_state(&mut self, state: SchedulerState, optim: &mut Optim) {
        self.last_epoch = state.last_epoch;
        optim.set_learning_rate(self.lr_at(self.last_epoch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Var};
    use reelgraph_core::{OptimizerConfig, SgdParams};

    fn optim() -> Optim {
        let var = Var::zeros((1,), DType::F32, &candle_core::Device::Cpu).unwrap();
        Optim::new(
            vec![var],
            &OptimizerConfig::Sgd(SgdParams {
                lr: 1.0,
                momentum: 0.0,
            }),
        )
        .unwrap()
    }

    #[test]
    fn step_schedule_halves_every_interval() {
        let sched = LrScheduler::new(
            SchedulerConfig::Step {
                step_size: 3,
                gamma: 0.5,
            },
            1.0,
        );
        let lrs: Vec<f64> = (0..7).map(|e| sched.lr_at(e)).collect();
        assert_eq!(lrs, vec![1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 0.25]);
    }

    #[test]
    fn exponential_schedule_decays_every_epoch() {
        let sched = LrScheduler::new(SchedulerConfig::Exponential { gamma: 0.9 }, 2.0);
        assert!((sched.lr_at(0) - 2.0).abs() < 1e-12);
        assert!((sched.lr_at(1) - 1.8).abs() < 1e-12);
        assert!((sched.lr_at(3) - 2.0 * 0.9f64.powi(3)).abs() < 1e-12);
    }

    #[test]
    fn stepping_updates_the_optimizer() {
        let mut optim = optim();
        let mut sched = LrScheduler::new(SchedulerConfig::Exponential { gamma: 0.1 }, 1.0);
        sched.step(&mut optim);
        assert!((optim.learning_rate() - 0.1).abs() < 1e-12);
        sched.step(&mut optim);
        assert!((optim.learning_rate() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn restored_state_reproduces_the_sequence() {
        let mut a = optim();
        let mut sched_a = LrScheduler::new(SchedulerConfig::Exponential { gamma: 0.5 }, 1.0);
        for _ in 0..4 {
            sched_a.step(&mut a);
        }

        let mut b = optim();
        let mut sched_b = LrScheduler::new(SchedulerConfig::Exponential { gamma: 0.5 }, 1.0);
        sched_b.load_state(sched_a.state(), &mut b);
        assert_eq!(a.learning_rate(), b.learning_rate());

        sched_a.step(&mut a);
        sched_b.step(&mut b);
        assert_eq!(a.learning_rate(), b.learning_rate());
    }
}
