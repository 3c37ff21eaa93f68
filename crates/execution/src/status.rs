//! Status vocabularies for jobs and the nodes within them.
//!
//! These are the two closed sets of values persisted to
//! `workflow_executions.status` and `node_executions.status` respectively.
//! Transient scheduling states (queued, retrying) live in
//! [`crate::attempt::NodeAttempt`] history, not in the persisted status
//! column.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single node within a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Currently executing (including mid-retry).
    Running,
    /// Completed without error.
    Success,
    /// Exhausted retries, or failed with no route to recover.
    Failed,
    /// Halted by a `Stop` failure action or a job-level cancellation.
    Stopped,
    /// Bypassed: `skipOnError`, or a branch not taken.
    Skipped,
}

impl NodeStatus {
    /// Returns `true` if this status will never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns `true` if the node is currently doing work.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if the node reached [`Self::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` if the node reached [`Self::Failed`].
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an entire job (one execution of a compiled workflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// At least one node is running or queued to run.
    Running,
    /// Every node reached a successful or skipped terminal state.
    Success,
    /// A `Fail`/`CompensateAndFail` error policy was applied to an
    /// unresolved stop.
    Failed,
    /// Cancellation has been requested but pending work has not yet unwound.
    CancelRequested,
    /// Cancellation completed; no further nodes will run.
    Cancelled,
}

impl JobStatus {
    /// Returns `true` if this status will never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if the job is still making progress.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::CancelRequested)
    }

    /// Returns `true` if the job reached [`Self::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` if the job reached [`Self::Failed`].
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::CancelRequested => "cancel_requested",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
