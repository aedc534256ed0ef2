use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in reelgraph-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
    /// Configuration file does not exist.
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),
    /// A record referenced a field that could not be interpreted.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },
    /// An edge endpoint is outside its node set.
    #[error("edge endpoint {index} out of bounds for {node_type} (count {count})")]
    EndpointOutOfBounds {
        node_type: &'static str,
        index: u32,
        count: u32,
    },
    /// Split ratios must leave a non-empty training set.
    #[error("invalid split ratios: val {val} + test {test} must be < 1.0")]
    InvalidSplit { val: f32, test: f32 },
    /// Dataset is empty or otherwise unusable.
    #[error("dataset error: {0}")]
    Dataset(String),
}

/// Result type alias for reelgraph-core.
pub type Result<T> = std::result::Result<T, Error>;
