//! Append-only scalar metric stream.
//!
//! One JSON object per line in `scalars.jsonl` under the run directory:
//! `{"tag": "loss/train", "step": 3, "value": 0.41}`. Tags namespace the
//! metric, steps are epoch indices. Line-oriented JSON keeps the stream
//! appendable across resumed runs and trivially greppable.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::Result;

pub const SCALARS_FILE: &str = "scalars.jsonl";

#[derive(Debug, Serialize)]
struct ScalarRecord<'a> {
    tag: &'a str,
    step: usize,
    value: f64,
    /// Seconds since the Unix epoch at write time.
    wall_time: f64,
}

pub struct ScalarWriter {
    writer: BufWriter<File>,
}

impl ScalarWriter {
    /// Open (appending) the scalar stream of a run directory.
    pub fn open(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(SCALARS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn add_scalar(&mut self, tag: &str, step: usize, value: f64) -> Result<()> {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let record = ScalarRecord {
            tag,
            step,
            value,
            wall_time,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
