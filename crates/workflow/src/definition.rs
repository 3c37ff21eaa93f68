//! The user-facing workflow wire format consumed by [`crate::builder::PlanBuilder`].
//!
//! Unknown fields are ignored on deserialization, matching the external
//! wire contract: callers may send a richer document than this crate reads.

use flowline_core::WorkflowId;
use serde::{Deserialize, Serialize};

/// A workflow as authored by a user: nodes and edges, not yet resolved into
/// a [`crate::model::ExecutionPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Definition-local identifier, distinct from the runtime `workflowId`.
    #[serde(default)]
    pub id: Option<String>,
    /// The workflow this definition belongs to.
    #[serde(default)]
    pub workflow_id: Option<WorkflowId>,
    /// Human-readable name.
    pub name: String,
    /// Declared nodes.
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    /// Declared edges between nodes.
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

/// One node in the raw wire format, before kind inference and normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    /// Node identifier as authored; may be empty (rejected by the builder).
    pub id: String,
    /// Executor key, if present directly on the node.
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    /// Editor-shaped payload; `data.nodeType` is an alternate location for
    /// the executor key used by some authoring tools.
    #[serde(default)]
    pub data: Option<RawNodeData>,
    /// Structural kind, if the author wants to override inference.
    #[serde(default)]
    pub kind: Option<crate::model::StepKind>,
    /// Data-flow classification, defaults to `Transform` if absent.
    #[serde(default)]
    pub classification: Option<crate::model::StepClassification>,
    /// Opaque executor configuration.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Scheduling hints.
    #[serde(default)]
    pub execution_hints: RawExecutionHints,
    /// Per-node failure policy.
    #[serde(default)]
    pub on_failure: Option<RawFailurePolicy>,
    /// Metrics enable-flags.
    #[serde(default)]
    pub metrics: Option<crate::model::MetricsFlags>,
    /// Named output ports.
    #[serde(default)]
    pub output_ports: Vec<String>,
}

/// Alternate location for a node's executor key, used by some editors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawNodeData {
    /// Executor key.
    #[serde(default)]
    pub node_type: Option<String>,
}

/// Raw scheduling hints, using plain strings/numbers the builder normalizes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawExecutionHints {
    /// Scheduling mode for this node.
    #[serde(default)]
    pub mode: Option<crate::model::ExecutionMode>,
    /// Batch size hint.
    #[serde(default)]
    pub chunk_size: Option<u32>,
    /// Partition count for `mode = Partitioned`.
    #[serde(default)]
    pub partition_count: Option<u32>,
    /// Override for `FailurePolicy::max_retries`.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-node timeout, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Explicit join target for a `Fork` node.
    #[serde(default)]
    pub join_node_id: Option<String>,
}

/// Raw failure policy from the wire format (`onFailure`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFailurePolicy {
    /// What to do on failure.
    pub action: crate::model::FailureAction,
    /// Retry budget for `action = Retry`.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Delay between retries, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    /// Target node for `action = Route`.
    #[serde(default)]
    pub route_to_node: Option<String>,
    /// Treat failures as skips regardless of `action`.
    #[serde(default)]
    pub skip_on_error: bool,
}

/// An edge between two nodes in the raw wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdge {
    /// Source node ID.
    pub source: String,
    /// Target node ID.
    pub target: String,
    /// Optional named output port on the source.
    #[serde(default)]
    pub source_handle: Option<String>,
    /// Optional named input port on the target.
    #[serde(default)]
    pub target_handle: Option<String>,
    /// Whether this edge carries control/error flow rather than data.
    #[serde(default)]
    pub is_control: bool,
}
