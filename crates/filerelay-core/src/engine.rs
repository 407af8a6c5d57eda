//! Sequential delivery engine.
//!
//! Files are delivered one at a time in scanner order. Each file walks the
//! state machine below and the engine does not look at the next file until
//! the current one is finalized:
//!
//! ```text
//! READING ──ok──▶ SENDING ──▶ CLASSIFIED ──terminal──▶ FINALIZING ──▶ FINALIZED
//!    ▲                            │                       │  ▲
//!    └──── wait retry_delay ◀─────┘ retryable             └──┘ store write failed
//! ```
//!
//! Retryable outcomes re-enter `READING` for the same file with no attempt
//! limit. The only ways out are a terminal outcome, an operator marking the
//! file in the store, or a shutdown request.

use crate::classifier::{classify, classify_read_failure};
use crate::client::{DeliveryClient, DeliveryRequest};
use crate::config::RetryPolicy;
use crate::error::Result;
use crate::paths;
use crate::scanner;
use crate::store::ProcessedStore;
use crate::types::{DeliveryOutcome, FileRecord, OutcomeKind, ProcessedStatus};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// How the engine waits between attempts.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

impl<F: FnMut(Duration)> Sleeper for F {
    fn sleep(&mut self, duration: Duration) {
        self(duration)
    }
}

/// Blocks the current thread; wakes early once the shutdown flag is raised.
#[derive(Debug, Default, Clone)]
pub struct ThreadSleeper {
    shutdown: Option<Arc<AtomicBool>>,
}

impl ThreadSleeper {
    pub fn interruptible(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        match &self.shutdown {
            Some(flag) => crate::schedule::sleep_interruptible(duration, flag),
            None => std::thread::sleep(duration),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// The file currently being worked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlight {
    pub filename: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub status: ProcessedStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Files finalized by this cycle, in the order they were finalized.
    pub finalized: Vec<FileReport>,
    /// Files an operator marked while the engine was retrying them.
    pub operator_marked: Vec<String>,
    /// Total retry waits across all files.
    pub retries: u32,
    /// Files still pending when the cycle stopped early.
    pub remaining: usize,
    pub interrupted: bool,
}

impl CycleReport {
    pub fn count(&self, status: ProcessedStatus) -> usize {
        self.finalized.iter().filter(|f| f.status == status).count()
    }
}

enum Disposition {
    Finalized(FileReport),
    OperatorMarked,
    Interrupted,
}

enum FileState {
    Reading,
    Sending(FileRecord),
    Classified(DeliveryOutcome),
    Finalizing(ProcessedStatus),
}

enum Wait {
    Retry,
    OperatorMarked,
    Interrupted,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<S, C, W = ThreadSleeper> {
    store: S,
    client: C,
    sleeper: W,
    policy: RetryPolicy,
    shutdown: Option<Arc<AtomicBool>>,
    in_flight: Option<InFlight>,
    retries: u32,
}

impl<S: ProcessedStore, C: DeliveryClient> Engine<S, C, ThreadSleeper> {
    pub fn new(store: S, client: C, policy: RetryPolicy) -> Self {
        Self {
            store,
            client,
            sleeper: ThreadSleeper::default(),
            policy,
            shutdown: None,
            in_flight: None,
            retries: 0,
        }
    }
}

impl<S: ProcessedStore, C: DeliveryClient, W: Sleeper> Engine<S, C, W> {
    pub fn with_sleeper<W2: Sleeper>(self, sleeper: W2) -> Engine<S, C, W2> {
        Engine {
            store: self.store,
            client: self.client,
            sleeper,
            policy: self.policy,
            shutdown: self.shutdown,
            in_flight: self.in_flight,
            retries: self.retries,
        }
    }

    /// Stop at the next file boundary or retry wait once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The file being delivered and its attempt number, if any.
    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn current_attempt(&self) -> u32 {
        self.in_flight.as_ref().map_or(0, |f| f.attempt)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    /// Deliver every pending file in `directory`, in order.
    ///
    /// Returns once every file found at the start of the cycle is finalized,
    /// or early if shutdown was requested. Fails only when the directory or
    /// the store cannot be read.
    pub fn run_cycle(&mut self, directory: &Path) -> Result<CycleReport> {
        tracing::info!(directory = %directory.display(), "starting file processing");
        let pending = scanner::list_pending(directory, &self.store)?;
        let mut report = CycleReport::default();
        let retries_before = self.retries;

        for (i, filename) in pending.iter().enumerate() {
            if self.shutdown_requested() {
                report.interrupted = true;
                report.remaining = pending.len() - i;
                break;
            }
            match self.process_file(directory, filename) {
                Disposition::Finalized(file) => report.finalized.push(file),
                Disposition::OperatorMarked => report.operator_marked.push(filename.clone()),
                Disposition::Interrupted => {
                    report.interrupted = true;
                    report.remaining = pending.len() - i;
                    break;
                }
            }
        }
        self.in_flight = None;
        report.retries = self.retries - retries_before;

        if !pending.is_empty() {
            tracing::info!(
                succeeded = report.count(ProcessedStatus::Success),
                failed = report.count(ProcessedStatus::Error),
                total = pending.len(),
                interrupted = report.interrupted,
                "file processing completed"
            );
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Per-file state machine
    // -----------------------------------------------------------------------

    fn process_file(&mut self, directory: &Path, filename: &str) -> Disposition {
        tracing::info!(filename, "processing file");
        self.in_flight = Some(InFlight {
            filename: filename.to_string(),
            attempt: 1,
        });
        let mut state = FileState::Reading;
        let mut mark_failures = 0u32;

        loop {
            state = match state {
                FileState::Reading => match read_file(directory, filename) {
                    Ok(record) => {
                        tracing::debug!(filename, chars = record.content.len(), "read file");
                        FileState::Sending(record)
                    }
                    Err(e) => FileState::Classified(classify_read_failure(&e)),
                },

                FileState::Sending(record) => {
                    let request = DeliveryRequest::new(&record);
                    let attempt = self.client.send(&request);
                    FileState::Classified(classify(&attempt))
                }

                FileState::Classified(outcome) => match outcome.terminal_status() {
                    Some(status) => {
                        log_delivered(filename, &outcome);
                        FileState::Finalizing(status)
                    }
                    None => {
                        self.log_retry(filename, &outcome);
                        match self.wait_before_retry(filename) {
                            Wait::Retry => {
                                if let Some(f) = self.in_flight.as_mut() {
                                    f.attempt += 1;
                                }
                                FileState::Reading
                            }
                            Wait::OperatorMarked => {
                                tracing::warn!(
                                    filename,
                                    attempts = self.current_attempt(),
                                    "file was marked by an operator, no longer retrying"
                                );
                                return Disposition::OperatorMarked;
                            }
                            Wait::Interrupted => return self.interrupted(filename),
                        }
                    }
                },

                FileState::Finalizing(status) => {
                    match self.store.mark(filename, status, Utc::now()) {
                        Ok(_) => {
                            return Disposition::Finalized(FileReport {
                                filename: filename.to_string(),
                                status,
                                attempts: self.current_attempt(),
                            })
                        }
                        Err(e) => {
                            mark_failures += 1;
                            // The downstream already has the payload; only the
                            // bookkeeping is retried.
                            tracing::error!(
                                filename,
                                status = %status,
                                attempt = mark_failures,
                                error = %e,
                                retry_in_secs = self.policy.retry_delay.as_secs_f64(),
                                "failed to record processed file, retrying"
                            );
                            if self.shutdown_requested() {
                                return self.interrupted(filename);
                            }
                            self.sleeper.sleep(self.policy.retry_delay);
                            self.retries += 1;
                            FileState::Finalizing(status)
                        }
                    }
                }
            };
        }
    }

    fn wait_before_retry(&mut self, filename: &str) -> Wait {
        if self.shutdown_requested() {
            return Wait::Interrupted;
        }
        self.sleeper.sleep(self.policy.retry_delay);
        self.retries += 1;
        if self.shutdown_requested() {
            return Wait::Interrupted;
        }
        match self.store.contains(filename) {
            Ok(true) => Wait::OperatorMarked,
            Ok(false) => Wait::Retry,
            Err(e) => {
                tracing::warn!(filename, error = %e, "could not re-check processed-state store");
                Wait::Retry
            }
        }
    }

    fn interrupted(&self, filename: &str) -> Disposition {
        tracing::info!(
            filename,
            attempts = self.current_attempt(),
            "shutdown requested, abandoning in-flight file"
        );
        Disposition::Interrupted
    }

    fn log_retry(&self, filename: &str, outcome: &DeliveryOutcome) {
        let attempt = self.current_attempt();
        let retry_in_secs = self.policy.retry_delay.as_secs_f64();
        match outcome {
            DeliveryOutcome::LocalReadFailure { reason } => tracing::error!(
                filename,
                attempt,
                outcome = %OutcomeKind::LocalReadFailure,
                reason = %reason,
                retry_in_secs,
                "failed to read file, retrying"
            ),
            DeliveryOutcome::Undelivered {
                http_status,
                reason,
            } => tracing::error!(
                filename,
                attempt,
                outcome = %OutcomeKind::Undelivered,
                http_status = ?http_status,
                reason = %reason,
                retry_in_secs,
                "delivery failed, retrying"
            ),
            DeliveryOutcome::UnexpectedFailure { reason } => tracing::error!(
                filename,
                attempt,
                outcome = %OutcomeKind::UnexpectedFailure,
                reason = %reason,
                retry_in_secs,
                "unexpected error during delivery, retrying"
            ),
            DeliveryOutcome::DeliveredSuccess { .. } | DeliveryOutcome::DeliveredError { .. } => {}
        }
    }
}

fn log_delivered(filename: &str, outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::DeliveredSuccess { http_status, id } => tracing::info!(
            filename,
            http_status,
            id = id.as_deref().unwrap_or("unknown"),
            "delivered; processing succeeded"
        ),
        DeliveryOutcome::DeliveredError { http_status, id } => tracing::warn!(
            filename,
            http_status,
            id = id.as_deref().unwrap_or("unknown"),
            "delivered; downstream reported a processing error"
        ),
        _ => {}
    }
}

fn read_file(directory: &Path, filename: &str) -> std::io::Result<FileRecord> {
    let path = paths::file_path(directory, filename);
    let bytes = std::fs::read(&path)?;
    let content = String::from_utf8(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(FileRecord {
        filename: filename.to_string(),
        content,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
