use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ProcessedStatus
// ---------------------------------------------------------------------------

/// Terminal status persisted for a finalized file.
///
/// Only terminal outcomes exist here, so the store can never be handed a
/// retryable verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedStatus {
    Success,
    Error,
}

impl ProcessedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessedStatus::Success => "success",
            ProcessedStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProcessedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessedStatus {
    type Err = crate::error::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ProcessedStatus::Success),
            "error" => Ok(ProcessedStatus::Error),
            _ => Err(crate::error::RelayError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessedEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub filename: String,
    pub processed_at: DateTime<Utc>,
    pub status: ProcessedStatus,
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// A file read for delivery. Lives only while the engine works on it.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub filename: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// DeliveryOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    DeliveredSuccess {
        http_status: u16,
        id: Option<String>,
    },
    DeliveredError {
        http_status: u16,
        id: Option<String>,
    },
    Undelivered {
        http_status: Option<u16>,
        reason: String,
    },
    LocalReadFailure {
        reason: String,
    },
    UnexpectedFailure {
        reason: String,
    },
}

impl DeliveryOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            DeliveryOutcome::DeliveredSuccess { .. } => OutcomeKind::DeliveredSuccess,
            DeliveryOutcome::DeliveredError { .. } => OutcomeKind::DeliveredError,
            DeliveryOutcome::Undelivered { .. } => OutcomeKind::Undelivered,
            DeliveryOutcome::LocalReadFailure { .. } => OutcomeKind::LocalReadFailure,
            DeliveryOutcome::UnexpectedFailure { .. } => OutcomeKind::UnexpectedFailure,
        }
    }

    /// The status to persist, or `None` when the outcome must be retried.
    pub fn terminal_status(&self) -> Option<ProcessedStatus> {
        match self {
            DeliveryOutcome::DeliveredSuccess { .. } => Some(ProcessedStatus::Success),
            DeliveryOutcome::DeliveredError { .. } => Some(ProcessedStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_status().is_some()
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            DeliveryOutcome::DeliveredSuccess { http_status, .. }
            | DeliveryOutcome::DeliveredError { http_status, .. } => Some(*http_status),
            DeliveryOutcome::Undelivered { http_status, .. } => *http_status,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    DeliveredSuccess,
    DeliveredError,
    Undelivered,
    LocalReadFailure,
    UnexpectedFailure,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::DeliveredSuccess => "delivered_success",
            OutcomeKind::DeliveredError => "delivered_error",
            OutcomeKind::Undelivered => "undelivered",
            OutcomeKind::LocalReadFailure => "local_read_failure",
            OutcomeKind::UnexpectedFailure => "unexpected_failure",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
