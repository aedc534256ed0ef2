//! Command-line trainer for the reelgraph movie recommender.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use reelgraph_core::TrainConfig;
use reelgraph_train::Trainer;

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "reelgraph", version, about = "Train a LightGCN movie recommender")]
struct Args {
    /// Training configuration file [default: config.yaml; a checkpointed
    /// run keeps its own config unless this is given explicitly]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Checkpoint to load model weights from
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Continue the checkpointed run where it stopped instead of
    /// warm-starting a new one
    #[arg(long, requires = "checkpoint")]
    resume: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut trainer = match args.checkpoint {
        Some(ref path) if args.resume => Trainer::from_checkpoint(path, true, None)
            .with_context(|| format!("resuming from {}", path.display()))?,
        Some(ref path) => {
            // Only an explicit --config overrides the checkpointed one.
            let config = args.config.as_deref().map(load_config).transpose()?;
            Trainer::from_checkpoint(path, false, config)
                .with_context(|| format!("warm-starting from {}", path.display()))?
        }
        None => {
            let path = args
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
            Trainer::new(load_config(&path)?)?
        }
    };

    let report = trainer.fit()?;
    println!(
        "test: loss {:.4}, accuracy {:.4}, f1 [{:.4}, {:.4}]",
        report.loss, report.accuracy, report.f1[0], report.f1[1]
    );
    println!("artifacts: {}", trainer.run_dir().display());
    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<TrainConfig> {
    TrainConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}
