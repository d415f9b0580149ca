//! Error types for process measurement and run aggregation.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    /// No running process matched the server lookup.
    #[error("failed to resolve server process: {0}")]
    Resolution(String),

    /// The process exited after it was resolved.
    #[error("process {0} is gone")]
    ProcessGone(u32),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run set has {len} entries, nothing left after {warmup} warm-up runs")]
    InsufficientData { len: usize, warmup: usize },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid format in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}

impl BenchError {
    /// True for conditions that only mean the process exited under us.
    pub fn is_process_gone(&self) -> bool {
        matches!(self, BenchError::ProcessGone(_))
    }
}
