//! Pure decision logic for what the runtime should do after a node fails.
//!
//! Kept deliberately free of any runtime state: `decide` is a function of
//! `(policy, attempt, failure)` only, mirroring `flowline_workflow`'s
//! preference for small pure functions over stateful methods (see
//! `transition.rs`).

use flowline_core::NodeId;
use flowline_workflow::{FailureAction, FailurePolicy, WorkflowErrorPolicy};

use crate::error::RuntimeError;

/// What the runtime should do after a node's executor reports failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    /// Re-run the node after `delay_ms`.
    Retry {
        /// Delay before the next attempt, in milliseconds.
        delay_ms: u64,
    },
    /// Mark the node skipped and continue downstream as if it had succeeded.
    Skip,
    /// Transition directly to the named node instead of stopping the branch.
    Route {
        /// The node to transition to.
        target: NodeId,
    },
    /// Halt the owning branch and escalate per [`WorkflowErrorPolicy`].
    Stop,
}

/// Decide what the runtime should do with a node failure, given its policy
/// and how many attempts have already been made (0-indexed).
///
/// `skip_on_error` overrides `action` unconditionally: a node configured to
/// swallow failures never retries or routes, it just skips.
#[must_use]
pub fn decide(policy: &FailurePolicy, attempt: u32, _failure: &RuntimeError) -> FailureDecision {
    if policy.skip_on_error {
        return FailureDecision::Skip;
    }

    match policy.action {
        FailureAction::Skip => FailureDecision::Skip,
        FailureAction::Route => match &policy.route_to_node {
            Some(target) => FailureDecision::Route {
                target: target.clone(),
            },
            None => FailureDecision::Stop,
        },
        FailureAction::Stop => FailureDecision::Stop,
        FailureAction::Retry => {
            if attempt < policy.max_retries {
                FailureDecision::Retry {
                    delay_ms: policy.retry_delay_ms,
                }
            } else {
                FailureDecision::Stop
            }
        }
    }
}

/// Whether `node_type`/`classification`/`config` identify a compensation
/// step, per the workflow-level error policy's compensation pass.
///
/// A node is a compensator if it is explicitly typed as one, or if its
/// opaque config carries the `isCompensator` escape hatch for node types
/// that don't want a dedicated `Compensation` kind.
#[must_use]
pub fn is_compensator(
    classification: flowline_workflow::StepClassification,
    node_type: &str,
    config: &serde_json::Value,
) -> bool {
    (classification == flowline_workflow::StepClassification::Control && node_type == "Compensation")
        || config
            .get("isCompensator")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
}

/// Final disposition of a job after a branch stopped, per
/// [`WorkflowErrorPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// The job should be marked failed.
    Fail,
    /// The job should be marked failed, after compensation steps run.
    CompensateThenFail,
    /// The job should be marked stopped (treated as `Cancelled` by the
    /// runtime's status column, since `Stopped` has no job-level status).
    Stop,
    /// The job should be marked successful, after compensation steps run.
    CompensateThenSucceed,
}

/// Map a [`WorkflowErrorPolicy`] to the job-level disposition it implies once
/// a branch has stopped.
#[must_use]
pub fn job_disposition(policy: WorkflowErrorPolicy) -> JobDisposition {
    match policy {
        WorkflowErrorPolicy::Fail => JobDisposition::Fail,
        WorkflowErrorPolicy::Stop => JobDisposition::Stop,
        WorkflowErrorPolicy::CompensateAndFail => JobDisposition::CompensateThenFail,
        WorkflowErrorPolicy::CompensateAndComplete => JobDisposition::CompensateThenSucceed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> RuntimeError {
        RuntimeError::CancellationRequested
    }

    #[test]
    fn skip_on_error_overrides_action() {
        let policy = FailurePolicy {
            action: FailureAction::Retry,
            skip_on_error: true,
            ..FailurePolicy::stop()
        };
        assert_eq!(decide(&policy, 0, &failure()), FailureDecision::Skip);
    }

    #[test]
    fn retry_under_max_retries() {
        let policy = FailurePolicy {
            action: FailureAction::Retry,
            max_retries: 3,
            retry_delay_ms: 500,
            ..FailurePolicy::stop()
        };
        assert_eq!(
            decide(&policy, 1, &failure()),
            FailureDecision::Retry { delay_ms: 500 }
        );
    }

    #[test]
    fn retry_escalates_to_stop_after_max_retries() {
        let policy = FailurePolicy {
            action: FailureAction::Retry,
            max_retries: 2,
            ..FailurePolicy::stop()
        };
        assert_eq!(decide(&policy, 2, &failure()), FailureDecision::Stop);
    }

    #[test]
    fn route_to_configured_node() {
        let target = NodeId::new("error-handler").unwrap();
        let policy = FailurePolicy {
            action: FailureAction::Route,
            route_to_node: Some(target.clone()),
            ..FailurePolicy::stop()
        };
        assert_eq!(decide(&policy, 0, &failure()), FailureDecision::Route { target });
    }

    #[test]
    fn route_without_target_falls_back_to_stop() {
        let policy = FailurePolicy {
            action: FailureAction::Route,
            route_to_node: None,
            ..FailurePolicy::stop()
        };
        assert_eq!(decide(&policy, 0, &failure()), FailureDecision::Stop);
    }

    #[test]
    fn plain_skip_action() {
        let policy = FailurePolicy {
            action: FailureAction::Skip,
            ..FailurePolicy::stop()
        };
        assert_eq!(decide(&policy, 0, &failure()), FailureDecision::Skip);
    }

    #[test]
    fn default_policy_stops() {
        assert_eq!(
            decide(&FailurePolicy::default(), 0, &failure()),
            FailureDecision::Stop
        );
    }

    #[test]
    fn compensator_by_kind() {
        assert!(is_compensator(
            flowline_workflow::StepClassification::Control,
            "Compensation",
            &serde_json::Value::Null,
        ));
    }

    #[test]
    fn compensator_by_config_escape_hatch() {
        assert!(is_compensator(
            flowline_workflow::StepClassification::Transform,
            "CustomRollback",
            &serde_json::json!({"isCompensator": true}),
        ));
    }

    #[test]
    fn not_a_compensator() {
        assert!(!is_compensator(
            flowline_workflow::StepClassification::Transform,
            "Filter",
            &serde_json::Value::Null,
        ));
    }

    #[test]
    fn job_disposition_mapping() {
        assert_eq!(job_disposition(WorkflowErrorPolicy::Fail), JobDisposition::Fail);
        assert_eq!(job_disposition(WorkflowErrorPolicy::Stop), JobDisposition::Stop);
        assert_eq!(
            job_disposition(WorkflowErrorPolicy::CompensateAndFail),
            JobDisposition::CompensateThenFail
        );
        assert_eq!(
            job_disposition(WorkflowErrorPolicy::CompensateAndComplete),
            JobDisposition::CompensateThenSucceed
        );
    }
}
