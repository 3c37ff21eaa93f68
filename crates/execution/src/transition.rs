//! State machine transition validation for job and node statuses.

use crate::error::RuntimeError;
use crate::status::{JobStatus, NodeStatus};

/// Returns `true` if the job-level transition from `from` to `to` is valid.
///
/// `(Running, Cancelled)` is allowed alongside the cooperative-cancellation
/// path: a `WorkflowErrorPolicy::Stop` disposition maps straight to
/// `Cancelled` without ever observing a `cancel_requested` checkpoint.
#[must_use]
pub fn can_transition_job(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Running, JobStatus::Success)
            | (JobStatus::Running, JobStatus::Failed)
            | (JobStatus::Running, JobStatus::CancelRequested)
            | (JobStatus::Running, JobStatus::Cancelled)
            | (JobStatus::CancelRequested, JobStatus::Cancelled)
            | (JobStatus::CancelRequested, JobStatus::Failed)
    )
}

/// Validate a job-level transition, returning an error if invalid.
pub fn validate_job_transition(from: JobStatus, to: JobStatus) -> Result<(), RuntimeError> {
    if can_transition_job(from, to) {
        Ok(())
    } else {
        Err(RuntimeError::invalid_job_transition(from, to))
    }
}

/// Returns `true` if the node-level transition from `from` to `to` is valid.
///
/// `(Running, Running)` is allowed: a retry re-enters `Running` for its next
/// attempt without leaving the status column.
#[must_use]
pub fn can_transition_node(from: NodeStatus, to: NodeStatus) -> bool {
    matches!(
        (from, to),
        (NodeStatus::Running, NodeStatus::Running)
            | (NodeStatus::Running, NodeStatus::Success)
            | (NodeStatus::Running, NodeStatus::Failed)
            | (NodeStatus::Running, NodeStatus::Stopped)
            | (NodeStatus::Running, NodeStatus::Skipped)
    )
}

/// Validate a node-level transition, returning an error if invalid.
pub fn validate_node_transition(from: NodeStatus, to: NodeStatus) -> Result<(), RuntimeError> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(RuntimeError::invalid_node_transition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_job_transitions() {
        assert!(can_transition_job(JobStatus::Running, JobStatus::Success));
        assert!(can_transition_job(JobStatus::Running, JobStatus::Failed));
        assert!(can_transition_job(
            JobStatus::Running,
            JobStatus::CancelRequested
        ));
        assert!(can_transition_job(
            JobStatus::CancelRequested,
            JobStatus::Cancelled
        ));
    }

    #[test]
    fn stop_disposition_maps_running_straight_to_cancelled() {
        assert!(can_transition_job(JobStatus::Running, JobStatus::Cancelled));
    }

    #[test]
    fn invalid_job_transitions() {
        assert!(!can_transition_job(JobStatus::Success, JobStatus::Running));
        assert!(!can_transition_job(
            JobStatus::Cancelled,
            JobStatus::Running
        ));
        assert!(!can_transition_job(JobStatus::Running, JobStatus::Running));
    }

    #[test]
    fn validate_job_transition_ok() {
        assert!(validate_job_transition(JobStatus::Running, JobStatus::Success).is_ok());
    }

    #[test]
    fn validate_job_transition_err() {
        let err = validate_job_transition(JobStatus::Success, JobStatus::Running).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
    }

    #[test]
    fn valid_node_transitions() {
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Running));
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Success));
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Failed));
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Stopped));
        assert!(can_transition_node(NodeStatus::Running, NodeStatus::Skipped));
    }

    #[test]
    fn invalid_node_transitions() {
        assert!(!can_transition_node(NodeStatus::Success, NodeStatus::Running));
        assert!(!can_transition_node(NodeStatus::Failed, NodeStatus::Running));
        assert!(!can_transition_node(
            NodeStatus::Skipped,
            NodeStatus::Success
        ));
    }

    #[test]
    fn validate_node_transition_err() {
        let err =
            validate_node_transition(NodeStatus::Stopped, NodeStatus::Running).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
    }
}
