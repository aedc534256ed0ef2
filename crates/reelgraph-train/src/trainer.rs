//! The training loop.
//!
//! A [`Trainer`] owns everything a run needs: dataset, model, optimizer,
//! optional scheduler, loss scaler, and the run directory it writes
//! checkpoints, scalars, and the loss plot into. Each epoch shuffles the
//! train split, steps once per minibatch with global-norm gradient
//! clipping, evaluates the validation split, and checkpoints `last.pt`
//! (plus `best.pt` on a validation-loss improvement).
//!
//! Resuming rebuilds the dataset from the checkpointed config (same seed,
//! so the splits are identical), restores model and optimizer state, and
//! continues from the epoch after the last completed one.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor, Var};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use reelgraph_core::{RecBatch, RecDataset, SupervisedSplit, TrainConfig};
use reelgraph_nn::{bce_with_logits, classification_metrics, EvalReport, HeteroLightGcn};

use crate::checkpoint::{
    export_weights, import_weights, sorted_vars, Checkpoint, MetricHistory,
};
use crate::context::{create_run_dir, RunContext};
use crate::error::Result;
use crate::optim::{clip_factor, global_grad_norm, Optim};
use crate::plot::{save_loss_plot, PLOT_FILE};
use crate::scaler::LossScaler;
use crate::scalars::ScalarWriter;
use crate::scheduler::LrScheduler;

pub const LAST_CHECKPOINT: &str = "last.pt";
pub const BEST_CHECKPOINT: &str = "best.pt";

/// Which held-out split to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSplit {
    Val,
    Test,
}

pub struct Trainer {
    config: TrainConfig,
    ctx: RunContext,
    dataset: RecDataset,
    model: HeteroLightGcn,
    vars: Vec<Var>,
    optim: Optim,
    scheduler: Option<LrScheduler>,
    scaler: LossScaler,
    run_dir: PathBuf,
    scalars: ScalarWriter,
    history: MetricHistory,
    start_epoch: usize,
    end_epoch: usize,
}

impl Trainer {
    /// Start a fresh run in the next numbered directory under the
    /// config's logdir.
    pub fn new(config: TrainConfig) -> Result<Self> {
        let mut ctx = RunContext::new(config.data.seed)?;
        let dataset = RecDataset::build(&config.data, &mut ctx.rng)?;
        let model = HeteroLightGcn::new(&dataset.metadata(), &config.model, &ctx.device)?;
        let vars = sorted_vars(model.varmap())?;
        let optim = Optim::new(vars.clone(), &config.train.optimizer)?;
        let scheduler = config
            .train
            .scheduler
            .clone()
            .map(|s| LrScheduler::new(s, config.train.optimizer.lr()));
        let scaler = LossScaler::new(config.train.amp);
        let run_dir = create_run_dir(&config.logdir)?;
        let scalars = ScalarWriter::open(&run_dir)?;
        let end_epoch = config.train.epochs;

        info!(run_dir = %run_dir.display(), epochs = end_epoch, "starting run");
        Ok(Self {
            config,
            ctx,
            dataset,
            model,
            vars,
            optim,
            scheduler,
            scaler,
            run_dir,
            scalars,
            history: MetricHistory::default(),
            start_epoch: 0,
            end_epoch,
        })
    }

    /// Build a trainer from a checkpoint.
    ///
    /// With `resume` the full run state is restored and training
    /// continues where it stopped, in the original run directory. Without
    /// it only the model weights carry over: a fresh optimizer, schedule,
    /// and run directory, configured by `config` (falling back to the
    /// checkpointed config when none is given).
    pub fn from_checkpoint(
        path: &Path,
        resume: bool,
        config: Option<TrainConfig>,
    ) -> Result<Self> {
        let ckpt = Checkpoint::load(path)?;
        let config = if resume {
            ckpt.config.clone()
        } else {
            config.unwrap_or_else(|| ckpt.config.clone())
        };

        let mut ctx = RunContext::new(config.data.seed)?;
        let dataset = RecDataset::build(&config.data, &mut ctx.rng)?;
        let model = HeteroLightGcn::new(&dataset.metadata(), &config.model, &ctx.device)?;
        import_weights(model.varmap(), &ckpt.model)?;
        let vars = sorted_vars(model.varmap())?;
        let mut optim = Optim::new(vars.clone(), &config.train.optimizer)?;
        let mut scheduler = config
            .train
            .scheduler
            .clone()
            .map(|s| LrScheduler::new(s, config.train.optimizer.lr()));

        let (scaler, run_dir, history, start_epoch, end_epoch) = if resume {
            optim.load_state(&ckpt.optimizer)?;
            if let (Some(sched), Some(state)) = (scheduler.as_mut(), ckpt.scheduler) {
                sched.load_state(state, &mut optim);
            }
            std::fs::create_dir_all(&ckpt.log_dir)?;
            info!(
                run_dir = %ckpt.log_dir.display(),
                epoch = ckpt.epoch,
                "resuming run"
            );
            (
                ckpt.scaler,
                ckpt.log_dir,
                ckpt.history,
                ckpt.epoch + 1,
                ckpt.end_epoch,
            )
        } else {
            let run_dir = create_run_dir(&config.logdir)?;
            info!(
                run_dir = %run_dir.display(),
                from = %path.display(),
                "warm-starting from checkpoint weights"
            );
            (
                LossScaler::new(config.train.amp),
                run_dir,
                MetricHistory::default(),
                0,
                config.train.epochs,
            )
        };
        let scalars = ScalarWriter::open(&run_dir)?;

        Ok(Self {
            config,
            ctx,
            dataset,
            model,
            vars,
            optim,
            scheduler,
            scaler,
            run_dir,
            scalars,
            history,
            start_epoch,
            end_epoch,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn end_epoch(&self) -> usize {
        self.end_epoch
    }

    pub fn model(&self) -> &HeteroLightGcn {
        &self.model
    }

    fn best_val_loss(&self) -> f32 {
        self.history
            .val_loss
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min)
    }

    /// One pass over the shuffled train split. Returns the mean
    /// (unscaled) loss over all examples.
    fn train_epoch(&mut self, bar: &ProgressBar) -> Result<f32> {
        let mut total = 0f64;
        let mut count = 0usize;
        let loader = self.dataset.loader(
            &self.dataset.train,
            self.config.data.batch_size,
            true,
            &mut self.ctx.rng,
        );
        for batch in loader {
            let (logits, _) = self.model.forward(&batch)?;
            let target = targets(&batch, self.model.device())?;
            let loss = bce_with_logits(&logits, &target)?;

            let scaled = self.scaler.scale_loss(&loss)?;
            let grads = scaled.backward()?;
            let scaled_norm = global_grad_norm(&self.vars, &grads)?;
            if !scaled_norm.is_finite() {
                // Overflow under the current loss scale: skip and back off.
                self.scaler.update(true);
                bar.inc(1);
                continue;
            }
            let norm = scaled_norm * self.scaler.inv_scale();
            self.optim
                .step(&grads, clip_factor(norm) * self.scaler.inv_scale())?;
            self.scaler.update(false);

            let n = batch.labels.len();
            total += loss.to_scalar::<f32>()? as f64 * n as f64;
            count += n;
            bar.inc(1);
        }
        Ok(if count == 0 {
            0.0
        } else {
            (total / count as f64) as f32
        })
    }

    /// Evaluate a held-out split without touching model state.
    pub fn evaluate(&mut self, which: EvalSplit) -> Result<EvalReport> {
        let split: &SupervisedSplit = match which {
            EvalSplit::Val => &self.dataset.val,
            EvalSplit::Test => &self.dataset.test,
        };
        let loader = self.dataset.loader(
            split,
            self.config.data.batch_size,
            false,
            &mut self.ctx.rng,
        );

        let mut total = 0f64;
        let mut probs = Vec::with_capacity(split.len());
        let mut labels = Vec::with_capacity(split.len());
        for batch in loader {
            let (logits, _) = self.model.forward(&batch)?;
            let target = targets(&batch, self.model.device())?;
            let loss = bce_with_logits(&logits, &target)?.to_scalar::<f32>()?;
            total += loss as f64 * batch.labels.len() as f64;
            probs.extend(
                candle_nn::ops::sigmoid(&logits)?
                    .flatten_all()?
                    .to_vec1::<f32>()?,
            );
            labels.extend_from_slice(&batch.labels);
        }

        let loss = if labels.is_empty() {
            0.0
        } else {
            (total / labels.len() as f64) as f32
        };
        let (accuracy, f1) = classification_metrics(&probs, &labels);
        Ok(EvalReport { loss, accuracy, f1 })
    }

    /// Run the remaining epochs (checkpointing and re-rendering the loss
    /// plot each one), then score the test split.
    pub fn fit(&mut self) -> Result<EvalReport> {
        let batches_per_epoch = self
            .dataset
            .train
            .len()
            .div_ceil(self.config.data.batch_size);
        let mut best = self.best_val_loss();

        for epoch in self.start_epoch..self.end_epoch {
            let bar = epoch_bar(epoch, self.end_epoch, batches_per_epoch);
            let train_loss = self.train_epoch(&bar)?;
            bar.finish_and_clear();

            let val = self.evaluate(EvalSplit::Val)?;
            if let Some(sched) = self.scheduler.as_mut() {
                sched.step(&mut self.optim);
            }

            self.history.train_loss.push(train_loss);
            self.history.val_loss.push(val.loss);
            self.history.val_accuracy.push(val.accuracy);
            self.history.val_f1.push(val.f1);

            let lr = self.optim.learning_rate();
            self.scalars.add_scalar("loss/train", epoch, train_loss as f64)?;
            self.scalars.add_scalar("loss/val", epoch, val.loss as f64)?;
            self.scalars
                .add_scalar("val/accuracy", epoch, val.accuracy as f64)?;
            self.scalars
                .add_scalar("val/f1_neg", epoch, val.f1[0] as f64)?;
            self.scalars
                .add_scalar("val/f1_pos", epoch, val.f1[1] as f64)?;
            self.scalars.add_scalar(
                "val/f1_avg",
                epoch,
                ((val.f1[0] + val.f1[1]) / 2.0) as f64,
            )?;
            self.scalars.add_scalar("lr", epoch, lr)?;
            self.scalars.flush()?;

            info!(
                epoch,
                train_loss,
                val_loss = val.loss,
                val_accuracy = val.accuracy,
                lr,
                "epoch complete"
            );

            let ckpt = self.to_checkpoint(epoch)?;
            ckpt.save(&self.run_dir.join(LAST_CHECKPOINT))?;
            if val.loss < best {
                best = val.loss;
                ckpt.save(&self.run_dir.join(BEST_CHECKPOINT))?;
            }
            // Refreshed alongside the checkpoint so an interrupted run
            // keeps a plot of the epochs it completed.
            save_loss_plot(
                &self.run_dir.join(PLOT_FILE),
                &self.history.train_loss,
                &self.history.val_loss,
            )?;
        }

        let test = self.evaluate(EvalSplit::Test)?;
        self.scalars
            .add_scalar("test/loss", self.end_epoch, test.loss as f64)?;
        self.scalars
            .add_scalar("test/accuracy", self.end_epoch, test.accuracy as f64)?;
        self.scalars.flush()?;
        info!(
            test_loss = test.loss,
            test_accuracy = test.accuracy,
            "run finished"
        );
        Ok(test)
    }

    fn to_checkpoint(&self, epoch: usize) -> Result<Checkpoint> {
        Ok(Checkpoint {
            config: self.config.clone(),
            epoch,
            end_epoch: self.end_epoch,
            model: export_weights(self.model.varmap())?,
            optimizer: self.optim.state()?,
            scheduler: self.scheduler.as_ref().map(|s| s.state()),
            scaler: self.scaler.clone(),
            history: self.history.clone(),
            log_dir: self.run_dir.clone(),
        })
    }
}

fn targets(batch: &RecBatch, device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_vec(
        batch.labels.clone(),
        (batch.labels.len(),),
        device,
    )?)
}

fn epoch_bar(epoch: usize, end_epoch: usize, batches: usize) -> ProgressBar {
    let bar = ProgressBar::new(batches as u64);
    let style = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(format!("epoch {}/{}", epoch + 1, end_epoch));
    bar
}
