use std::time::{Duration, Instant};

use crate::error::HarnessError;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:64707/graphql";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BATCH_SIZES: [i64; 3] = [10, 50, 100];

/// The only externally configurable values: where, how long, and which sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub batch_sizes: Vec<i64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            batch_sizes: DEFAULT_BATCH_SIZES.to_vec(),
        }
    }
}

impl HarnessConfig {
    /// Reject configurations that can never produce a meaningful sweep.
    ///
    /// Batch sizes are not range-checked here. A negative size is rejected by
    /// the payload synthesizer, which halts the run.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            HarnessError::Config(format!("invalid endpoint '{}': {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HarnessError::Config(format!(
                "endpoint must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(HarnessError::Config("timeout must be non-zero".to_string()));
        }
        if self.batch_sizes.is_empty() {
            return Err(HarnessError::Config(
                "at least one batch size is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

/// Run `f` once and capture its wall-clock duration.
pub fn measure<T>(f: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed();
    Timed { value, elapsed }
}

/// Milliseconds per item; a zero count is treated as one.
pub fn per_item_ms(elapsed: Duration, count: u64) -> f64 {
    let denom = count.max(1) as f64;
    elapsed.as_secs_f64() * 1000.0 / denom
}
