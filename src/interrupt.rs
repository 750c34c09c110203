//! Ctrl-C handling for the blocking sweep.
//!
//! The first interrupt sets the pipeline's cancel flag, so the sweep stops
//! before the next batch size and still prints its summary and report. A
//! second interrupt ends the process.

use crate::error::HarnessError;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Exit status used when a second interrupt forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Listening for the signal failed; the flag may or may not be set.
    SignalUnavailable,
    /// A second interrupt arrived after the flag was set.
    Forced,
}

/// Wait on `next_signal` and set `flag` on the first delivery. Resolves when a
/// second signal arrives or listening fails.
pub async fn forward_interrupts<S, F>(mut next_signal: S, flag: Arc<AtomicBool>) -> InterruptOutcome
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!("failed to listen for interrupts: {e}");
        return InterruptOutcome::SignalUnavailable;
    }
    info!("received interrupt, stopping after the current batch size (press Ctrl+C again to exit)");
    flag.store(true, Ordering::SeqCst);

    match next_signal().await {
        Ok(()) => InterruptOutcome::Forced,
        Err(e) => {
            warn!("failed to listen for interrupts: {e}");
            InterruptOutcome::SignalUnavailable
        }
    }
}

/// Listen for Ctrl-C on a background thread for the rest of the process.
pub fn install_interrupt_handler(flag: Arc<AtomicBool>) -> Result<(), HarnessError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            let outcome = runtime.block_on(forward_interrupts(tokio::signal::ctrl_c, flag));
            if outcome == InterruptOutcome::Forced {
                warn!("second interrupt, exiting");
                std::process::exit(FORCED_EXIT_CODE);
            }
        })?;
    Ok(())
}
