//! Pipeline orchestration: the fixed stage sequence, run once per batch size.
//!
//! Per batch size the state machine walks
//! `HeaderCreate → HeaderUpdate → MicroCreate → MicroUpdate → ContentCreate →
//! ContentUpdate → Done`, threading identifiers through
//! [`DependencyBindings`]. A failed stage empties the chain it produces, so
//! only the stages that need its output are skipped. The iteration moves to
//! `Aborted` once a failure or an empty chain leaves nothing downstream that
//! can run, and the sweep continues with the next batch size. Only a
//! synthesis error halts the whole run.

use crate::dataset::{synthesize, DependencyBindings};
use crate::error::HarnessError;
use crate::stage::{StageExecutor, StageResult};
use crate::transport::Transport;
use crate::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    HeaderCreate,
    HeaderUpdate,
    MicroCreate,
    MicroUpdate,
    ContentCreate,
    ContentUpdate,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn start() -> Self {
        PipelineState::HeaderCreate
    }

    /// The stage executed on entering this state; `None` for terminal states.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::HeaderCreate => Some(Stage::HeaderCreate),
            PipelineState::HeaderUpdate => Some(Stage::HeaderUpdate),
            PipelineState::MicroCreate => Some(Stage::MicroCreate),
            PipelineState::MicroUpdate => Some(Stage::MicroUpdate),
            PipelineState::ContentCreate => Some(Stage::ContentCreate),
            PipelineState::ContentUpdate => Some(Stage::ContentUpdate),
            PipelineState::Done | PipelineState::Aborted => None,
        }
    }

    /// Successor after the current stage succeeded.
    pub fn advance(self) -> Self {
        match self {
            PipelineState::HeaderCreate => PipelineState::HeaderUpdate,
            PipelineState::HeaderUpdate => PipelineState::MicroCreate,
            PipelineState::MicroCreate => PipelineState::MicroUpdate,
            PipelineState::MicroUpdate => PipelineState::ContentCreate,
            PipelineState::ContentCreate => PipelineState::ContentUpdate,
            PipelineState::ContentUpdate | PipelineState::Done => PipelineState::Done,
            PipelineState::Aborted => PipelineState::Aborted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::HeaderCreate => "header_create",
            PipelineState::HeaderUpdate => "header_update",
            PipelineState::MicroCreate => "micro_create",
            PipelineState::MicroUpdate => "micro_update",
            PipelineState::ContentCreate => "content_create",
            PipelineState::ContentUpdate => "content_update",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        }
    }
}

/// Whether any stage from `state` onwards has the identifiers it needs.
fn downstream_runnable(mut state: PipelineState, bindings: &DependencyBindings) -> bool {
    while let Some(stage) = state.stage() {
        let runnable = stage
            .consumes()
            .map_or(true, |chain| !bindings.get(chain).is_empty());
        if runnable {
            return true;
        }
        state = state.advance();
    }
    false
}

/// One pass through the stage pipeline for a single batch size.
#[derive(Debug, Clone)]
pub struct BatchIteration {
    pub batch_size: i64,
    pub results: BTreeMap<Stage, StageResult>,
    /// Terminal state: `Done` or `Aborted`.
    pub state: PipelineState,
    pub abort_reason: Option<String>,
}

impl BatchIteration {
    fn new(batch_size: i64) -> Self {
        Self {
            batch_size,
            results: BTreeMap::new(),
            state: PipelineState::start(),
            abort_reason: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state == PipelineState::Aborted
    }

    /// Results of stages that were actually sent, in pipeline order.
    pub fn executed(&self) -> impl Iterator<Item = &StageResult> {
        self.results.values().filter(|r| !r.skipped)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageResult> {
        self.results.values().filter(|r| !r.success)
    }
}

/// Receives pipeline events as they happen.
pub trait StageObserver {
    fn stage_finished(&mut self, batch_size: i64, result: &StageResult);

    fn iteration_started(&mut self, _batch_size: i64) {}

    fn iteration_finished(&mut self, _iteration: &BatchIteration) {}
}

/// The ordered sweep of batch sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkRun {
    pub batch_sizes: Vec<i64>,
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub iterations: Vec<BatchIteration>,
    /// Stopped early by the cancel flag.
    pub cancelled: bool,
}

impl SweepOutcome {
    /// The first stage of the first batch size got no reply from the
    /// endpoint. An HTTP error status means the endpoint is up.
    pub fn endpoint_unreachable(&self) -> bool {
        self.iterations
            .first()
            .and_then(|it| it.results.get(&Stage::HeaderCreate))
            .is_some_and(StageResult::is_unreachable)
    }
}

pub struct Pipeline<T> {
    executor: StageExecutor<T>,
    cancel: Arc<AtomicBool>,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(transport: T) -> Self {
        Self {
            executor: StageExecutor::new(transport),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that stops the sweep before the next batch size once set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run_iteration<O: StageObserver + ?Sized>(
        &self,
        batch_size: i64,
        observer: &mut O,
    ) -> Result<BatchIteration, HarnessError> {
        let mut iteration = BatchIteration::new(batch_size);
        let mut bindings = DependencyBindings::default();
        let mut blocked_by: Option<Stage> = None;

        while let Some(stage) = iteration.state.stage() {
            let payload = synthesize(stage, batch_size, &bindings).map_err(|source| {
                HarnessError::Synthesis {
                    stage,
                    batch_size,
                    source,
                }
            })?;

            let result = if stage.consumes().is_some() && payload.is_empty() {
                debug!(%stage, batch_size, "no identifiers bound, skipping");
                StageResult::skipped(stage)
            } else {
                self.executor.run(&payload)
            };
            observer.stage_finished(batch_size, &result);

            if let Some(chain) = stage.produces() {
                bindings.bind(chain, result.ids.clone());
            }
            let failure = (!result.success).then(|| {
                format!(
                    "{} failed: {}",
                    stage.operation(),
                    result.error.as_deref().unwrap_or("unknown")
                )
            });
            iteration.results.insert(stage, result);
            iteration.state = iteration.state.advance();

            if let Some(reason) = failure {
                if !downstream_runnable(iteration.state, &bindings) {
                    iteration.abort_reason = Some(reason);
                    iteration.state = PipelineState::Aborted;
                    break;
                }
                warn!(batch_size, "{reason}; continuing with independent stages");
                continue;
            }

            if blocked_by.is_none()
                && stage.produces().is_some_and(|c| bindings.get(c).is_empty())
                && !downstream_runnable(iteration.state, &bindings)
            {
                blocked_by = Some(stage);
            }
        }

        if let Some(stage) = blocked_by {
            iteration.state = PipelineState::Aborted;
            iteration.abort_reason = Some(format!(
                "{} returned no identifiers; nothing downstream can run",
                stage.operation()
            ));
        }

        match &iteration.abort_reason {
            Some(reason) => warn!(batch_size, "iteration aborted: {reason}"),
            None => info!(batch_size, "iteration complete"),
        }
        Ok(iteration)
    }

    /// Run every batch size in order. Stage failures never surface here;
    /// only synthesis errors do.
    pub fn run_sweep<O: StageObserver + ?Sized>(
        &self,
        run: &BenchmarkRun,
        observer: &mut O,
    ) -> Result<SweepOutcome, HarnessError> {
        let mut outcome = SweepOutcome::default();

        for &batch_size in &run.batch_sizes {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(batch_size, "sweep cancelled before batch size");
                outcome.cancelled = true;
                break;
            }

            info!(batch_size, "starting iteration");
            observer.iteration_started(batch_size);
            let iteration = self.run_iteration(batch_size, observer)?;
            observer.iteration_finished(&iteration);
            outcome.iterations.push(iteration);
        }

        Ok(outcome)
    }
}
