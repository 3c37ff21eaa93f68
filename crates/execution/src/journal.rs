//! Execution journal — the in-memory shape of rows appended to
//! `execution_logs`.

use chrono::{DateTime, Utc};
use flowline_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::status::JobStatus;

/// A journal entry recording a significant event during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    /// The job was started.
    JobStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
    },

    /// A node started executing.
    NodeStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that started.
        node_id: NodeId,
        /// Which attempt number (0-indexed).
        attempt: u32,
    },

    /// A node completed successfully.
    NodeCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that completed.
        node_id: NodeId,
        /// Records processed, summed across read/write/skip counters.
        records_processed: u64,
    },

    /// A node failed.
    NodeFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that failed.
        node_id: NodeId,
        /// Error message.
        error: String,
    },

    /// A node was skipped.
    NodeSkipped {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that was skipped.
        node_id: NodeId,
        /// Reason for skipping.
        reason: String,
    },

    /// A node is being retried.
    NodeRetrying {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node being retried.
        node_id: NodeId,
        /// Which attempt is being made (0-indexed).
        attempt: u32,
    },

    /// A barrier join released its waiting branches.
    JoinReleased {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The join node.
        node_id: NodeId,
        /// How many upstream branches completed before release.
        upstream_count: usize,
    },

    /// The entire job reached a terminal status.
    JobFinished {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Final job status.
        status: JobStatus,
    },

    /// A cancellation was requested.
    CancellationRequested {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Reason for cancellation.
        reason: String,
    },
}

impl JournalEntry {
    /// Get the timestamp of this entry.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::JobStarted { timestamp }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::NodeFailed { timestamp, .. }
            | Self::NodeSkipped { timestamp, .. }
            | Self::NodeRetrying { timestamp, .. }
            | Self::JoinReleased { timestamp, .. }
            | Self::JobFinished { timestamp, .. }
            | Self::CancellationRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get the node ID associated with this entry, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeSkipped { node_id, .. }
            | Self::NodeRetrying { node_id, .. }
            | Self::JoinReleased { node_id, .. } => Some(node_id.clone()),
            Self::JobStarted { .. } | Self::JobFinished { .. } | Self::CancellationRequested { .. } => {
                None
            }
        }
    }

    /// Returns `true` if this is a node-level event.
    #[must_use]
    pub fn is_node_event(&self) -> bool {
        self.node_id().is_some()
    }

    /// Returns `true` if this is a job-level event.
    #[must_use]
    pub fn is_job_event(&self) -> bool {
        self.node_id().is_none()
    }

    /// Serialize this entry to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize an entry from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
