//! Stage executor: one batched request per stage, classified into a
//! [`StageResult`].
//!
//! Nothing in here returns an error. Transport, protocol and operation-level
//! failures all end up as `success == false` with the message attached.
//! Partial success (`totalFailed > 0` with `success == true`) stays a success
//! and carries only the identifiers the service actually returned.

use crate::dataset::{Identifier, StagePayload};
use crate::error::ClientError;
use crate::harness::per_item_ms;
use crate::transport::{Exchange, Transport};
use crate::{Stage, StageKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection, timeout or HTTP status failure.
    Transport,
    /// Response could not be decoded into the expected shape.
    Protocol,
    /// Decoded fine, but `success` was false or `errors` was present.
    Logical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    /// Not sent because the binding it depends on was empty.
    pub skipped: bool,
    pub requested: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// Identifiers in response order; empty unless a producing stage succeeded.
    pub ids: Vec<Identifier>,
    /// SHA-256 of the request body.
    pub fingerprint: Option<String>,
    /// Status code when the endpoint answered but the stage still failed at
    /// the transport or protocol level.
    pub http_status: Option<u16>,
}

impl StageResult {
    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            success: true,
            skipped: true,
            requested: 0,
            succeeded: 0,
            failed: 0,
            elapsed: Duration::ZERO,
            error: None,
            failure: None,
            ids: Vec::new(),
            fingerprint: None,
            http_status: None,
        }
    }

    fn failed(
        stage: Stage,
        requested: u64,
        kind: FailureKind,
        message: String,
        elapsed: Duration,
        fingerprint: String,
    ) -> Self {
        Self {
            stage,
            success: false,
            skipped: false,
            requested,
            succeeded: 0,
            failed: requested,
            elapsed,
            error: Some(message),
            failure: Some(kind),
            ids: Vec::new(),
            fingerprint: Some(fingerprint),
            http_status: None,
        }
    }

    /// Failed without any reply from the endpoint (connect error or timeout).
    pub fn is_unreachable(&self) -> bool {
        self.failure == Some(FailureKind::Transport) && self.http_status.is_none()
    }

    pub fn is_partial(&self) -> bool {
        self.success && self.failed > 0
    }

    /// Count used for per-item rates: what was asked for on creates, what
    /// actually changed on updates.
    pub fn rate_count(&self) -> u64 {
        match self.stage.kind() {
            StageKind::Create => self.requested,
            StageKind::Update => self.succeeded,
        }
    }

    pub fn per_item_ms(&self) -> f64 {
        per_item_ms(self.elapsed, self.rate_count())
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Bulk result object under `data.<operation>`. Every field is optional at
/// the decode level; required-ness is checked per stage in [`interpret`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkResult {
    success: Option<bool>,
    total_requested: Option<u64>,
    total_inserted: Option<u64>,
    total_updated: Option<u64>,
    total_failed: Option<u64>,
    error_message: Option<String>,
    inserted_items: Option<Vec<Value>>,
}

#[derive(Debug, PartialEq)]
struct Outcome {
    requested: u64,
    succeeded: u64,
    failed: u64,
    ids: Vec<Identifier>,
}

fn protocol(msg: impl Into<String>) -> (FailureKind, String) {
    (FailureKind::Protocol, msg.into())
}

/// Classify a decoded response for `stage` that carried `sent` items.
fn interpret(stage: Stage, sent: u64, exchange: &Exchange) -> Result<Outcome, (FailureKind, String)> {
    let response = &exchange.response;
    if let Some(message) = response.first_error() {
        return Err((FailureKind::Logical, message.to_string()));
    }

    let op = stage.operation();
    let value = response
        .data
        .as_ref()
        .ok_or_else(|| protocol("response carries neither data nor errors"))?
        .get(op)
        .filter(|v| !v.is_null())
        .ok_or_else(|| protocol(format!("response is missing data.{op}")))?;

    let result: BulkResult = serde_json::from_value(value.clone())
        .map_err(|e| protocol(format!("data.{op} has unexpected shape: {e}")))?;

    match result.success {
        None => return Err(protocol(format!("data.{op} is missing required field success"))),
        Some(false) => {
            let message = result
                .error_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unknown".to_string());
            return Err((FailureKind::Logical, message));
        }
        Some(true) => {}
    }

    let succeeded = match stage.kind() {
        StageKind::Create => result.total_inserted,
        StageKind::Update => result.total_updated,
    }
    .ok_or_else(|| {
        protocol(format!(
            "data.{op} is missing required field {}",
            stage.count_field()
        ))
    })?;

    let requested = result.total_requested.unwrap_or(sent);
    let failed = result
        .total_failed
        .unwrap_or_else(|| requested.saturating_sub(succeeded));

    let ids = match stage.id_field() {
        None => Vec::new(),
        Some(field) => result
            .inserted_items
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let raw = item
                    .get(field)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| protocol(format!("insertedItems[{i}] has no {field}")))?;
                serde_json::from_value::<Identifier>(raw.clone())
                    .map_err(|e| protocol(format!("insertedItems[{i}].{field}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Outcome {
        requested,
        succeeded,
        failed,
        ids,
    })
}

pub struct StageExecutor<T> {
    transport: T,
}

impl<T: Transport> StageExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send every record of `payload` in one request and classify the reply.
    pub fn run(&self, payload: &StagePayload) -> StageResult {
        let stage = payload.stage();
        let sent = payload.len() as u64;
        let request = payload.request();
        let fingerprint = request.fingerprint();

        let exchange = match self.transport.execute(&request) {
            Ok(exchange) => exchange,
            Err(failure) => {
                let (kind, message) = match failure.error {
                    ClientError::Transport(m) => (FailureKind::Transport, m),
                    ClientError::Protocol(m) => (FailureKind::Protocol, m),
                };
                warn!(%stage, items = sent, ?kind, "stage failed: {message}");
                return StageResult {
                    http_status: failure.status,
                    ..StageResult::failed(
                        stage,
                        sent,
                        kind,
                        message,
                        failure.elapsed.unwrap_or(Duration::ZERO),
                        fingerprint,
                    )
                };
            }
        };

        match interpret(stage, sent, &exchange) {
            Ok(outcome) => {
                if outcome.failed > 0 {
                    info!(
                        %stage,
                        requested = outcome.requested,
                        succeeded = outcome.succeeded,
                        failed = outcome.failed,
                        "partial success"
                    );
                } else {
                    debug!(%stage, succeeded = outcome.succeeded, elapsed = ?exchange.elapsed, "stage ok");
                }
                StageResult {
                    stage,
                    success: true,
                    skipped: false,
                    requested: outcome.requested,
                    succeeded: outcome.succeeded,
                    failed: outcome.failed,
                    elapsed: exchange.elapsed,
                    error: None,
                    failure: None,
                    ids: outcome.ids,
                    fingerprint: Some(fingerprint),
                    http_status: None,
                }
            }
            Err((kind, message)) => {
                warn!(%stage, items = sent, ?kind, "stage failed: {message}");
                StageResult::failed(stage, sent, kind, message, exchange.elapsed, fingerprint)
            }
        }
    }
}
