use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lifecycle operation applied to a phase.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Bring the phase's effect into place.
    Start,

    /// Remove the phase's effect.
    #[default]
    Stop,

    /// Check whether the effect is in place.
    Status,
}

impl Operation {
    /// Lowercase label, also the argument handed to phase scripts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed status of a single phase.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    /// Nothing has run yet.
    #[default]
    NotStarted,

    /// An operation is in progress.
    Executing,

    /// The effect is in place.
    Running,

    /// The effect has been removed.
    Stopped,

    /// The last operation failed.
    Failed,
}

impl PhaseStatus {
    /// Label used in tables and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Executing => "executing",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of what a phase last did.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    /// Human readable phase name.
    pub name: String,

    /// Position of the phase in its chain.
    pub order: u32,

    /// When the last operation began.
    pub started_at: Option<DateTime<Utc>>,

    /// Last operation applied.
    pub operation: Operation,

    /// Observed status.
    pub status: PhaseStatus,

    /// Failure detail; empty on success.
    pub message: String,
}

impl PhaseRecord {
    /// Creates a record for a phase that has never run.
    pub fn new(name: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            order,
            started_at: None,
            operation: Operation::default(),
            status: PhaseStatus::NotStarted,
            message: String::new(),
        }
    }
}

/// Interior-mutable record owned by a phase implementation.
///
/// Readers only ever see clones taken under the lock.
#[derive(Debug)]
pub struct RecordCell(Mutex<PhaseRecord>);

impl RecordCell {
    /// Wraps a fresh record.
    pub fn new(name: impl Into<String>, order: u32) -> Self {
        Self(Mutex::new(PhaseRecord::new(name, order)))
    }

    /// Returns a copy of the current record.
    pub fn snapshot(&self) -> PhaseRecord {
        self.0.lock().clone()
    }

    /// Marks `operation` as in progress.
    pub fn begin(&self, operation: Operation) {
        let mut record = self.0.lock();
        record.operation = operation;
        record.status = PhaseStatus::Executing;
        record.started_at = Some(Utc::now());
    }

    /// Records the outcome of the current operation.
    pub fn finish(&self, status: PhaseStatus, message: impl Into<String>) {
        let mut record = self.0.lock();
        record.status = status;
        record.message = message.into();
    }
}
