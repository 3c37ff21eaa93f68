//! The immutable graph model a compiled plan is made of.
//!
//! [`StepNode`] and [`ExecutionPlan`] are frozen once built: the runtime
//! associates mutable per-execution state (status, timings, counts) with
//! node IDs elsewhere rather than mutating these objects.

use flowline_core::{NodeId, WorkflowId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Discriminant for what role a step plays in the compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// An ordinary single-predecessor, single-action step.
    Normal,
    /// Initiates two or more parallel branches that converge on a [`Self::Join`].
    Fork,
    /// Waits for every declared upstream branch of a fork to complete.
    Join,
    /// Branches on a predicate. Reserved; rejected by the job compiler today.
    Decision,
    /// A reference to a reusable group of steps, inlined at expansion time.
    Subgraph,
    /// The unique entry point of a plan.
    Start,
    /// A terminal leaf of a plan.
    End,
}

/// Semantic role a step plays in data flow, independent of [`StepKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepClassification {
    /// Produces data with no data-edge predecessors.
    Source,
    /// Consumes data with no data-edge successors.
    Sink,
    /// Transforms data flowing through it.
    Transform,
    /// Orchestration bookkeeping with no data payload of its own.
    Control,
    /// Directs flow without transforming the payload (e.g. Switch).
    Routing,
    /// Combines multiple inputs into one (e.g. Join, Collect).
    Aggregation,
    /// Splits one input into multiple outputs (e.g. Partition).
    Partition,
}

/// How a node's work should be scheduled relative to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Runs on a single worker, one unit of work at a time.
    Serial,
    /// Runs concurrently; requires an explicit join target for forks.
    Parallel,
    /// Split into fixed partitions processed independently.
    Partitioned,
}

/// What the runtime should do when a node's executor reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureAction {
    /// Halt the owning branch and escalate per [`WorkflowErrorPolicy`].
    Stop,
    /// Mark the node skipped and continue downstream normally.
    Skip,
    /// Re-execute up to `maxRetries` times, then escalate to [`Self::Stop`].
    Retry,
    /// Transition to the node named by `routeToNode` instead of stopping.
    Route,
}

/// Final-disposition policy chosen at the workflow level when a branch stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowErrorPolicy {
    /// Mark the job failed on any unresolved stop.
    Fail,
    /// Mark the job stopped.
    Stop,
    /// Run compensation steps, then mark the job failed.
    CompensateAndFail,
    /// Run compensation steps, then mark the job completed.
    CompensateAndComplete,
}

/// Per-node failure handling policy, attached to every [`StepNode`].
///
/// Failure policies are first-class data, not method overrides: deciding
/// what to do with a failure is a pure function of `(policy, failure,
/// attemptCount)`, implemented in `flowline_execution::failure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// What to do when the node's executor reports failure.
    pub action: FailureAction,
    /// Maximum retry attempts for `action = Retry`.
    #[serde(default = "FailurePolicy::default_max_retries")]
    pub max_retries: u32,
    /// Delay between retries, in milliseconds.
    #[serde(default = "FailurePolicy::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Target node for `action = Route`.
    #[serde(default)]
    pub route_to_node: Option<NodeId>,
    /// When set, failures are treated as skips regardless of `action`.
    #[serde(default)]
    pub skip_on_error: bool,
}

impl FailurePolicy {
    const fn default_max_retries() -> u32 {
        3
    }

    const fn default_retry_delay_ms() -> u64 {
        1000
    }

    /// The default policy: stop the branch on failure, no retries.
    #[must_use]
    pub fn stop() -> Self {
        Self {
            action: FailureAction::Stop,
            max_retries: Self::default_max_retries(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            route_to_node: None,
            skip_on_error: false,
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::stop()
    }
}

/// Scheduling hints attached to a [`StepNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutionHints {
    /// How this node's work should be scheduled.
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    /// Batch size hint for partitioned/streaming executors.
    #[serde(default)]
    pub chunk_size: Option<u32>,
    /// Number of partitions for `mode = Partitioned`.
    #[serde(default)]
    pub partition_count: Option<u32>,
    /// Overrides `FailurePolicy::max_retries` when set.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-node execution timeout, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// For `kind = Fork`: the explicit barrier target all branches join at.
    #[serde(default)]
    pub join_node_id: Option<NodeId>,
}

/// Enable-flags for the metrics a step records while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsFlags {
    /// Record wall-clock execution time.
    pub time: bool,
    /// Record records-read counts.
    pub read: bool,
    /// Record records-written counts.
    pub write: bool,
    /// Record error occurrences.
    pub error: bool,
}

impl Default for MetricsFlags {
    fn default() -> Self {
        Self {
            time: true,
            read: true,
            write: true,
            error: true,
        }
    }
}

/// One immutable node in a compiled [`ExecutionPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    /// Unique, non-empty identifier for this step.
    pub node_id: NodeId,
    /// Executor key this step's work is dispatched to (e.g. `"http.request"`).
    pub node_type: String,
    /// Opaque, executor-dependent configuration payload.
    #[serde(default = "serde_json::Value::default")]
    pub config: serde_json::Value,
    /// Downstream node IDs reached on a normal completion.
    #[serde(default)]
    pub next_steps: Vec<NodeId>,
    /// Downstream node IDs reached on `FAILED | STOPPED | UNKNOWN` status.
    #[serde(default)]
    pub error_steps: Vec<NodeId>,
    /// Metrics recorded while this step runs.
    #[serde(default)]
    pub metrics: MetricsFlags,
    /// What to do when this step's executor reports failure.
    #[serde(default)]
    pub exception_handling: FailurePolicy,
    /// Scheduling hints for this step.
    #[serde(default)]
    pub execution_hints: ExecutionHints,
    /// Data-flow role, independent of structural [`StepKind`].
    pub classification: StepClassification,
    /// Named output ports for multi-output steps (e.g. Switch branches).
    #[serde(default)]
    pub output_ports: Vec<String>,
    /// Structural role in the graph.
    pub kind: StepKind,
    /// Incoming node IDs, populated by [`crate::builder::PlanBuilder`].
    #[serde(default)]
    pub upstream_steps: Vec<NodeId>,
}

impl StepNode {
    /// Construct a step with the given identity, filling every other field
    /// with its default. Callers typically adjust fields directly afterward
    /// — this mirrors how `flowline-workflow`'s builder assembles steps from
    /// a raw node definition one field at a time.
    #[must_use]
    pub fn new(node_id: NodeId, node_type: impl Into<String>) -> Self {
        Self {
            node_id,
            node_type: node_type.into(),
            config: serde_json::Value::Null,
            next_steps: Vec::new(),
            error_steps: Vec::new(),
            metrics: MetricsFlags::default(),
            exception_handling: FailurePolicy::default(),
            execution_hints: ExecutionHints::default(),
            classification: StepClassification::Transform,
            output_ports: Vec::new(),
            kind: StepKind::Normal,
            upstream_steps: Vec::new(),
        }
    }

    /// Every node this step's completion or failure can transition to.
    pub fn outgoing(&self) -> impl Iterator<Item = &NodeId> {
        self.next_steps.iter().chain(self.error_steps.iter())
    }

    /// Whether this step has no successors of any kind (a terminal leaf).
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.next_steps.is_empty() && self.error_steps.is_empty()
    }
}

/// A validated, flattened, immutable plan ready for compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Node IDs with no data-edge predecessor, in declaration order.
    pub entry_step_ids: Vec<NodeId>,
    /// All steps in the plan, keyed by ID, preserving insertion order.
    pub steps: IndexMap<NodeId, StepNode>,
    /// The workflow this plan was derived from, if known.
    #[serde(default)]
    pub workflow_id: Option<WorkflowId>,
}

impl ExecutionPlan {
    /// Number of steps in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a step by ID.
    #[must_use]
    pub fn step(&self, id: &NodeId) -> Option<&StepNode> {
        self.steps.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_default_is_stop_with_three_retries() {
        let policy = FailurePolicy::default();
        assert_eq!(policy.action, FailureAction::Stop);
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_delay_ms, 1000);
        assert!(!policy.skip_on_error);
    }

    #[test]
    fn step_node_new_fills_sensible_defaults() {
        let id = NodeId::new("n1").unwrap();
        let step = StepNode::new(id.clone(), "filter");
        assert_eq!(step.node_id, id);
        assert_eq!(step.kind, StepKind::Normal);
        assert!(step.next_steps.is_empty());
        assert!(step.is_leaf());
    }

    #[test]
    fn step_node_outgoing_chains_next_and_error_steps() {
        let mut step = StepNode::new(NodeId::new("n1").unwrap(), "filter");
        step.next_steps.push(NodeId::new("n2").unwrap());
        step.error_steps.push(NodeId::new("n3").unwrap());
        let out: Vec<_> = step.outgoing().cloned().collect();
        assert_eq!(out, vec![NodeId::new("n2").unwrap(), NodeId::new("n3").unwrap()]);
    }

    #[test]
    fn execution_plan_step_lookup() {
        let id = NodeId::new("n1").unwrap();
        let mut steps = IndexMap::new();
        steps.insert(id.clone(), StepNode::new(id.clone(), "filter"));
        let plan = ExecutionPlan {
            entry_step_ids: vec![id.clone()],
            steps,
            workflow_id: None,
        };
        assert_eq!(plan.len(), 1);
        assert!(plan.step(&id).is_some());
    }
}
