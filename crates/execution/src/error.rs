//! Error types for job compilation and execution.

use flowline_core::NodeId;
use thiserror::Error;

use crate::status::{JobStatus, NodeStatus};

/// Errors raised while turning a validated [`flowline_workflow::ExecutionPlan`]
/// into a [`crate::compiler::CompiledJob`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompilationError {
    /// The plan references a [`flowline_workflow::StepKind`] the compiler
    /// does not schedule (`Decision`, or `Subgraph` that survived expansion).
    #[error("node {node} has unsupported kind {kind:?}")]
    UnsupportedNodeKind {
        /// The offending node.
        node: NodeId,
        /// The kind the compiler refused to schedule.
        kind: flowline_workflow::StepKind,
    },

    /// At least one known node type in [`flowline_action::ExecutorRegistry`]
    /// has no registered executor.
    #[error(transparent)]
    Compatibility(#[from] flowline_action::CompatibilityError),
}

/// Errors raised while a [`crate::compiler::CompiledJob`] is running.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// A node's executor reported [`flowline_action::ExecutorStatus::Failed`].
    #[error("node {node} failed: {source}")]
    ExecutorFailure {
        /// The node whose executor failed.
        node: NodeId,
        /// The error the executor reported.
        #[source]
        source: flowline_action::ActionError,
    },

    /// A node exceeded its `executionHints.timeoutMs`.
    #[error("node {node} timed out after {elapsed_ms}ms")]
    Timeout {
        /// The node that timed out.
        node: NodeId,
        /// How long the node ran before being timed out.
        elapsed_ms: u64,
    },

    /// A step was rejected because the runtime is shutting down.
    #[error("executor shutdown: runtime is no longer accepting work")]
    ExecutorShutdown,

    /// Cooperative cancellation was observed at a checkpoint.
    #[error("cancellation requested")]
    CancellationRequested,

    /// A node or job status transition violated the allowed state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status, rendered via `Display`.
        from: String,
        /// Attempted target status, rendered via `Display`.
        to: String,
    },

    /// A referenced node does not exist in the execution state.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A write or read through [`crate::repository::ExecutionRepository`]
    /// failed.
    #[error("persistence operation failed: {0}")]
    Persistence(String),
}

impl RuntimeError {
    /// Build an [`Self::InvalidTransition`] from node statuses.
    #[must_use]
    pub fn invalid_node_transition(from: NodeStatus, to: NodeStatus) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Build an [`Self::InvalidTransition`] from job statuses.
    #[must_use]
    pub fn invalid_job_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_node_kind_display() {
        let err = CompilationError::UnsupportedNodeKind {
            node: NodeId::new("decide").unwrap(),
            kind: flowline_workflow::StepKind::Decision,
        };
        assert!(err.to_string().contains("unsupported kind"));
    }

    #[test]
    fn invalid_node_transition_display() {
        let err = RuntimeError::invalid_node_transition(NodeStatus::Success, NodeStatus::Running);
        assert_eq!(err.to_string(), "invalid transition from success to running");
    }

    #[test]
    fn invalid_job_transition_display() {
        let err = RuntimeError::invalid_job_transition(JobStatus::Cancelled, JobStatus::Running);
        assert_eq!(err.to_string(), "invalid transition from cancelled to running");
    }

    #[test]
    fn node_not_found_display() {
        let id = NodeId::new("n1").unwrap();
        let err = RuntimeError::NodeNotFound(id);
        assert!(err.to_string().contains("node not found"));
    }

    #[test]
    fn cancellation_requested_display() {
        assert_eq!(
            RuntimeError::CancellationRequested.to_string(),
            "cancellation requested"
        );
    }
}
