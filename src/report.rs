//! Console metrics reporter.
//!
//! Consumes pipeline events, keeps an append-only log of stage results and
//! renders one stable line per stage as it happens, a summary per batch size,
//! and a closing banner. Write errors are logged and otherwise ignored.

use crate::pipeline::{BatchIteration, PipelineState, StageObserver};
use crate::stage::{FailureKind, StageResult};
use crate::{Stage, StageKind};
use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone)]
pub struct MetricRecord {
    /// Position of the iteration in the sweep.
    pub iteration: usize,
    pub batch_size: i64,
    pub stage: Stage,
    pub result: StageResult,
}

#[derive(Debug, Clone)]
struct IterationStatus {
    batch_size: i64,
    state: PipelineState,
    reason: Option<String>,
}

pub struct MetricsReporter<W: Write> {
    out: W,
    log: Vec<MetricRecord>,
    statuses: Vec<IterationStatus>,
    current: usize,
    cancelled: bool,
}

fn rule(ch: char) -> String {
    ch.to_string().repeat(RULE_WIDTH)
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn failure_label(result: &StageResult) -> &'static str {
    match result.failure {
        Some(FailureKind::Transport) if result.http_status.is_some() => "HTTP ERROR",
        Some(FailureKind::Transport) => "TRANSPORT ERROR",
        Some(FailureKind::Protocol) => "PROTOCOL ERROR",
        Some(FailureKind::Logical) | None => "FAILED",
    }
}

/// One stage outcome in the stable console format.
pub fn format_stage_line(result: &StageResult) -> String {
    let stage = result.stage;
    let label = format!("{:<9} {:<10}", stage.entity_label(), stage.action_label());

    if result.skipped {
        return format!("  {label} : skipped (0 items)");
    }
    if !result.success {
        return format!(
            "  {label} : {} - {} ({:.1} ms)",
            failure_label(result),
            result.error.as_deref().unwrap_or("unknown"),
            result.elapsed_ms()
        );
    }

    let verb = match stage.kind() {
        StageKind::Create => "inserted",
        StageKind::Update => "updated ",
    };
    let mut line = format!(
        "  {label} : {:8.1} ms | {}/{} {verb} | {:.1} ms/item",
        result.elapsed_ms(),
        result.succeeded,
        result.requested,
        result.per_item_ms()
    );
    if result.is_partial() {
        let _ = write!(line, " | {} failed", result.failed);
    }
    line
}

pub fn render_run_header(endpoint: &str, batch_sizes: &[i64]) -> String {
    let sizes: Vec<String> = batch_sizes.iter().map(|s| s.to_string()).collect();
    format!(
        "{eq}\n  PERFORMANCE TEST - BulkCreate + BulkUpdate Mutations\n  endpoint: {endpoint}\n  batch sizes: {}\n{eq}",
        sizes.join(", "),
        eq = rule('='),
    )
}

pub fn render_iteration_header(batch_size: i64) -> String {
    format!(
        "\n{dash}\n  BATCH SIZE: {batch_size} items\n{dash}",
        dash = rule('-')
    )
}

impl<W: Write> MetricsReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            log: Vec::new(),
            statuses: Vec::new(),
            current: 0,
            cancelled: false,
        }
    }

    /// Append a stage result to the log.
    pub fn record(&mut self, batch_size: i64, stage: Stage, result: &StageResult) {
        self.log.push(MetricRecord {
            iteration: self.current,
            batch_size,
            stage,
            result: result.clone(),
        });
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.log
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Write `text` plus a newline; failures are logged, never returned.
    pub fn emit(&mut self, text: &str) {
        let res = writeln!(self.out, "{text}").and_then(|_| self.out.flush());
        if let Err(e) = res {
            tracing::warn!("failed to write report output: {e}");
        }
    }

    fn latest_iteration(&self, batch_size: i64) -> Option<usize> {
        self.statuses
            .iter()
            .rposition(|s| s.batch_size == batch_size)
            .or_else(|| {
                self.log
                    .iter()
                    .rev()
                    .find(|r| r.batch_size == batch_size)
                    .map(|r| r.iteration)
            })
    }

    /// Summary line for the most recent iteration of `batch_size`.
    pub fn render_iteration_summary(&self, batch_size: i64) -> String {
        let Some(idx) = self.latest_iteration(batch_size) else {
            return format!("  => batch {batch_size}: no results");
        };
        let records: Vec<&MetricRecord> =
            self.log.iter().filter(|r| r.iteration == idx).collect();
        let executed = records.iter().filter(|r| !r.result.skipped).count();
        let skipped = records.len() - executed;
        let failed = records.iter().filter(|r| !r.result.success).count();
        let total: Duration = records.iter().map(|r| r.result.elapsed).sum();

        let status = self.statuses.get(idx);
        match status.map(|s| (s.state, s.reason.as_deref())) {
            Some((PipelineState::Aborted, reason)) => format!(
                "  => batch {batch_size}: ABORTED after {executed} stage(s), {:.1} ms - {}",
                ms(total),
                reason.unwrap_or("unknown")
            ),
            _ if failed > 0 => format!(
                "  => batch {batch_size}: done | {executed} sent, {skipped} skipped, {failed} failed | {:.1} ms total",
                ms(total)
            ),
            _ => format!(
                "  => batch {batch_size}: done | {executed} sent, {skipped} skipped | {:.1} ms total",
                ms(total)
            ),
        }
    }

    /// Closing banner with a per-iteration, per-stage breakdown.
    pub fn render_final_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n{}", rule('='));
        let _ = writeln!(out, "  SUMMARY");
        let _ = writeln!(out, "{}", rule('='));

        for (idx, status) in self.statuses.iter().enumerate() {
            let state = match status.state {
                PipelineState::Aborted => "ABORTED",
                _ => "done",
            };
            let _ = writeln!(out, "  batch {:>6} : {state}", status.batch_size);
            for rec in self.log.iter().filter(|r| r.iteration == idx) {
                let r = &rec.result;
                let detail = if r.skipped {
                    "skipped".to_string()
                } else if !r.success {
                    format!("{} - {}", failure_label(r), r.error.as_deref().unwrap_or("unknown"))
                } else {
                    format!(
                        "{:8.1} ms | {:>6.2} ms/item | {}/{}",
                        r.elapsed_ms(),
                        r.per_item_ms(),
                        r.succeeded,
                        r.requested
                    )
                };
                let _ = writeln!(out, "      {:<15} {detail}", rec.stage.as_str());
            }
        }

        let aborted = self.statuses.iter().filter(|s| s.state == PipelineState::Aborted).count();
        let _ = writeln!(
            out,
            "\n  {} iteration(s), {} aborted",
            self.statuses.len(),
            aborted
        );
        let _ = writeln!(out, "{}", rule('='));
        let _ = write!(
            out,
            "  {}\n{}",
            if self.cancelled { "TEST CANCELLED" } else { "TEST COMPLETE" },
            rule('=')
        );
        out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StageObserver for MetricsReporter<W> {
    fn stage_finished(&mut self, batch_size: i64, result: &StageResult) {
        self.record(batch_size, result.stage, result);
        let line = format_stage_line(result);
        self.emit(&line);
    }

    fn iteration_started(&mut self, batch_size: i64) {
        self.current = self.statuses.len();
        self.emit(&render_iteration_header(batch_size));
    }

    fn iteration_finished(&mut self, iteration: &BatchIteration) {
        self.statuses.push(IterationStatus {
            batch_size: iteration.batch_size,
            state: iteration.state,
            reason: iteration.abort_reason.clone(),
        });
        let summary = self.render_iteration_summary(iteration.batch_size);
        self.emit(&summary);
    }
}
