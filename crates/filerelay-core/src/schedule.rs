use crate::client::DeliveryClient;
use crate::engine::{Engine, Sleeper};
use crate::store::ProcessedStore;
use crate::types::ProcessedStatus;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLICE: Duration = Duration::from_millis(200);

/// Sleep for `duration`, returning early once `shutdown` is raised.
///
/// A duration too large to represent as a deadline sleeps until shutdown.
pub fn sleep_interruptible(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                SLICE.min(deadline - now)
            }
            None => SLICE,
        };
        std::thread::sleep(slice);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs one engine cycle per tick until shutdown or `max_cycles`.
///
/// Cycles never overlap: the next tick is scheduled only after the previous
/// cycle returns, however long its retries took.
pub struct Scheduler {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    max_cycles: Option<u64>,
}

impl Scheduler {
    pub fn new(interval: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            interval,
            shutdown,
            max_cycles: None,
        }
    }

    pub fn max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = Some(n);
        self
    }

    pub fn run<S, C, W>(&self, engine: &mut Engine<S, C, W>, directory: &Path) -> ScheduleSummary
    where
        S: ProcessedStore,
        C: DeliveryClient,
        W: Sleeper,
    {
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            "starting scheduler"
        );
        let mut summary = ScheduleSummary::default();

        while !self.shutdown.load(Ordering::SeqCst) {
            summary.cycles += 1;
            tracing::debug!(cycle = summary.cycles, "cycle");

            match engine.run_cycle(directory) {
                Ok(report) => {
                    summary.succeeded += report.count(ProcessedStatus::Success);
                    summary.failed += report.count(ProcessedStatus::Error);
                    if !report.finalized.is_empty() {
                        tracing::info!(
                            cycle = summary.cycles,
                            processed = report.finalized.len(),
                            "processed files"
                        );
                    }
                }
                // A missing or unreadable directory aborts this cycle only;
                // the next tick scans again.
                Err(e) => {
                    summary.failed_cycles += 1;
                    tracing::error!(cycle = summary.cycles, error = %e, "error processing files");
                }
            }

            if self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }
            sleep_interruptible(self.interval, &self.shutdown);
        }

        tracing::info!(cycles = summary.cycles, "scheduler stopped");
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
