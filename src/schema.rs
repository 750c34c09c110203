use crate::error::HarnessError;
use crate::harness::HarnessConfig;
use crate::pipeline::{BatchIteration, PipelineState, SweepOutcome};
use crate::stage::{FailureKind, StageResult};
use crate::Stage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub endpoint: String,
    pub batch_sizes: Vec<i64>,
    pub timeout_ms: u64,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn new(cfg: &HarnessConfig, timestamp_utc: String, git_sha: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            endpoint: cfg.endpoint.clone(),
            batch_sizes: cfg.batch_sizes.clone(),
            timeout_ms: u64::try_from(cfg.timeout.as_millis()).unwrap_or(u64::MAX),
            timestamp_utc,
            git_sha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMeasurement {
    pub stage: Stage,
    pub operation: String,
    pub success: bool,
    pub skipped: bool,

    pub requested: u64,
    pub succeeded: u64,
    pub failed: u64,

    pub elapsed_ns: u128,
    pub elapsed_ms: f64,
    pub per_item_ms: f64,

    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub http_status: Option<u16>,
    /// Hex SHA-256 of the request body; absent for skipped stages.
    pub request_sha256: Option<String>,
}

impl From<&StageResult> for StageMeasurement {
    fn from(r: &StageResult) -> Self {
        Self {
            stage: r.stage,
            operation: r.stage.operation().to_string(),
            success: r.success,
            skipped: r.skipped,
            requested: r.requested,
            succeeded: r.succeeded,
            failed: r.failed,
            elapsed_ns: r.elapsed.as_nanos(),
            elapsed_ms: r.elapsed_ms(),
            per_item_ms: if r.skipped { 0.0 } else { r.per_item_ms() },
            error: r.error.clone(),
            failure: r.failure,
            http_status: r.http_status,
            request_sha256: r.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub batch_size: i64,
    pub state: PipelineState,
    pub abort_reason: Option<String>,
    pub stages: Vec<StageMeasurement>,
}

impl From<&BatchIteration> for IterationRecord {
    fn from(it: &BatchIteration) -> Self {
        Self {
            batch_size: it.batch_size,
            state: it.state,
            abort_reason: it.abort_reason.clone(),
            // BTreeMap keyed by Stage: already in pipeline order.
            stages: it.results.values().map(StageMeasurement::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub run: RunMeta,
    pub cancelled: bool,
    pub iterations: Vec<IterationRecord>,
}

impl SweepReport {
    pub fn new(run: RunMeta, outcome: &SweepOutcome) -> Self {
        Self {
            run,
            cancelled: outcome.cancelled,
            iterations: outcome.iterations.iter().map(IterationRecord::from).collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, HarnessError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), HarnessError> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}
