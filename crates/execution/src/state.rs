//! Execution state tracking for jobs and the nodes within them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flowline_core::{ExecutionId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

use crate::attempt::NodeAttempt;
use crate::error::RuntimeError;
use crate::status::{JobStatus, NodeStatus};
use crate::transition::{validate_job_transition, validate_node_transition};

/// The execution state of a single node within a running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionState {
    /// Current status of the node.
    pub status: NodeStatus,
    /// All attempts made to execute this node.
    pub attempts: Vec<NodeAttempt>,
    /// When this node started its first attempt.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When this node reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message, set once the node reaches `Failed` or `Stopped`.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl NodeExecutionState {
    /// Create a new node execution state, already `Running` for its first
    /// attempt.
    ///
    /// Unlike a general state machine, nodes in this engine have no
    /// persisted pending/ready state: the job compiler determines readiness
    /// ahead of time, so a node's first recorded status is always `Running`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: NodeStatus::Running,
            attempts: vec![NodeAttempt::new(0)],
            started_at: Some(Utc::now()),
            completed_at: None,
            error_message: None,
        }
    }

    /// Number of attempts made so far.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Get the latest attempt, if any.
    #[must_use]
    pub fn latest_attempt(&self) -> Option<&NodeAttempt> {
        self.attempts.last()
    }

    /// Begin a new attempt (a retry), re-entering `Running`.
    pub fn begin_retry(&mut self) -> Result<(), RuntimeError> {
        validate_node_transition(self.status, NodeStatus::Running)?;
        self.status = NodeStatus::Running;
        self.attempts
            .push(NodeAttempt::new(self.attempts.len() as u32));
        Ok(())
    }

    /// Transition to a new terminal status, validating the transition.
    pub fn transition_to(&mut self, new_status: NodeStatus) -> Result<(), RuntimeError> {
        validate_node_transition(self.status, new_status)?;
        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

impl Default for NodeExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete execution state of a running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionState {
    /// Unique identifier for this execution.
    pub execution_id: ExecutionId,
    /// The workflow this job was compiled from.
    pub workflow_id: WorkflowId,
    /// Current job status.
    pub status: JobStatus,
    /// Per-node execution states.
    pub node_states: HashMap<NodeId, NodeExecutionState>,
    /// Optimistic concurrency version, bumped on each state change.
    pub version: u64,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the job started running.
    pub started_at: DateTime<Utc>,
    /// When the job completed.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobExecutionState {
    /// Create a new job execution state, already `Running`.
    #[must_use]
    pub fn new(execution_id: ExecutionId, workflow_id: WorkflowId) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            workflow_id,
            status: JobStatus::Running,
            node_states: HashMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: now,
            completed_at: None,
        }
    }

    /// Get a node's execution state.
    #[must_use]
    pub fn node_state(&self, node_id: &NodeId) -> Option<&NodeExecutionState> {
        self.node_states.get(node_id)
    }

    /// Set a node's execution state.
    pub fn set_node_state(&mut self, node_id: NodeId, state: NodeExecutionState) {
        self.node_states.insert(node_id, state);
    }

    /// Returns `true` if every tracked node is in a terminal status.
    #[must_use]
    pub fn all_nodes_terminal(&self) -> bool {
        self.node_states.values().all(|ns| ns.status.is_terminal())
    }

    /// IDs of nodes currently running.
    #[must_use]
    pub fn active_node_ids(&self) -> Vec<NodeId> {
        self.node_states
            .iter()
            .filter(|(_, ns)| ns.status.is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// IDs of nodes that reached `Success`.
    #[must_use]
    pub fn succeeded_node_ids(&self) -> Vec<NodeId> {
        self.node_states
            .iter()
            .filter(|(_, ns)| ns.status == NodeStatus::Success)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// IDs of nodes that reached `Failed`.
    #[must_use]
    pub fn failed_node_ids(&self) -> Vec<NodeId> {
        self.node_states
            .iter()
            .filter(|(_, ns)| ns.status == NodeStatus::Failed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Transition the job status, validating the transition and bumping the
    /// version.
    pub fn transition_status(&mut self, new_status: JobStatus) -> Result<(), RuntimeError> {
        validate_job_transition(self.status, new_status)?;
        self.status = new_status;
        self.version += 1;
        self.updated_at = Utc::now();
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
