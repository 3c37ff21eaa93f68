//! Node execution attempt tracking.

use chrono::{DateTime, Utc};
use flowline_action::{ActionError, ExecutorOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single attempt to execute a node, one per retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAttempt {
    /// Which attempt this is (0-indexed).
    pub attempt_number: u32,
    /// When this attempt started.
    pub started_at: DateTime<Utc>,
    /// When this attempt completed (if finished).
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Records read during this attempt.
    #[serde(default)]
    pub read_count: u64,
    /// Records written during this attempt.
    #[serde(default)]
    pub write_count: u64,
    /// Records skipped during this attempt.
    #[serde(default)]
    pub skip_count: u64,
    /// Error message if the attempt failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl NodeAttempt {
    /// Create a new attempt that has just started.
    #[must_use]
    pub fn new(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            started_at: Utc::now(),
            completed_at: None,
            read_count: 0,
            write_count: 0,
            skip_count: 0,
            error: None,
        }
    }

    /// Record an [`ExecutorOutcome`] as the result of this attempt.
    pub fn complete_with(&mut self, outcome: &ExecutorOutcome) {
        self.completed_at = Some(Utc::now());
        self.read_count = outcome.read_count;
        self.write_count = outcome.write_count;
        self.skip_count = outcome.skip_count;
        self.error = outcome.error.as_ref().map(ActionError::to_string);
    }

    /// Mark this attempt as failed for a reason the executor never reported
    /// (timeout, cancellation).
    pub fn complete_failure(&mut self, error: impl Into<String>) {
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Returns `true` if this attempt has finished (success or failure).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns `true` if this attempt succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.is_complete() && self.error.is_none()
    }

    /// Returns `true` if this attempt failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Calculate the duration of this attempt.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .map(|end| (end - self.started_at).to_std().unwrap_or(Duration::ZERO))
    }
}
