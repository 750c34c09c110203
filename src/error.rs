//! Error types for the benchmark harness.
//!
//! Only [`HarnessError`] halts a run. [`ClientError`] is produced per request
//! and folded into a `StageResult` by the stage executor.

use thiserror::Error;

/// Payload synthesis failures. These indicate a logic defect, not an
/// environmental condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("invalid record count: {0}")]
    InvalidCount(i64),
}

/// Failure of one request/response round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Connection failure, timeout or non-2xx status.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response arrived but could not be decoded into the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Conditions that stop the whole sweep.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("payload synthesis failed for {stage} at batch size {batch_size}: {source}")]
    Synthesis {
        stage: crate::Stage,
        batch_size: i64,
        #[source]
        source: SynthesisError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}
