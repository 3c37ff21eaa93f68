//! Structural checks run after expansion and before compilation.

use std::collections::HashSet;

use flowline_core::NodeId;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use thiserror::Error;

use crate::model::{ExecutionMode, ExecutionPlan, StepClassification, StepKind, StepNode};

/// Node types treated as control-only: they carry no data payload and
/// should not participate in data edges.
const CONTROL_ONLY_NODE_TYPES: &[&str] = &["FailJob", "Wait", "Checkpoint"];

/// Loosens or tightens individual [`ExecutionPlanValidator`] checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidatorConfig {
    /// Require every `FORK` to declare an explicit `joinNodeId` even when a
    /// single downstream convergence point could be inferred.
    pub strict_joins: bool,
    /// Require every `JOIN`'s upstreams to all trace back to the same
    /// declaring fork's immediate branches.
    pub strict_join_upstreams: bool,
    /// Require `JOIN` nodes to be reachable only via an explicit fork
    /// declaration (no implicit joins by indegree alone).
    pub require_explicit_join: bool,
}

/// Errors surfaced by [`ExecutionPlanValidator::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The plan has no entry points or no steps.
    #[error("plan is empty")]
    EmptyPlan,
    /// A step referenced an ID that is not a key of `steps`.
    #[error("{node} references unknown node {referenced} via {field}")]
    UnknownReference {
        /// The node holding the dangling reference.
        node: NodeId,
        /// The ID that does not exist in the plan.
        referenced: NodeId,
        /// Which field held the dangling reference.
        field: &'static str,
    },
    /// `nextSteps ∪ errorSteps` forms a cycle.
    #[error("cycle detected: {}", format_path(.path))]
    Cycle {
        /// The cycle, starting and ending at the same node.
        path: Vec<NodeId>,
    },
    /// A node is not reachable from any entry point.
    #[error("unreachable nodes: {}", format_ids(.nodes))]
    Orphan {
        /// Node IDs unreachable from every entry point.
        nodes: Vec<NodeId>,
    },
    /// Zero or more than one unambiguous start node was found.
    #[error("expected exactly one start node, found {found}")]
    MissingStart {
        /// How many candidate start nodes were found.
        found: usize,
    },
    /// No node qualifies as a terminal leaf.
    #[error("plan has no terminal node")]
    MissingTerminal,
    /// A `FORK` node has no `executionHints.joinNodeId`.
    #[error("fork {0} has no joinNodeId")]
    ForkMissingJoinId(NodeId),
    /// A `FORK`'s `joinNodeId` does not reference a `JOIN` node.
    #[error("fork {fork}'s join target {join} is not kind=JOIN")]
    JoinKindMismatch {
        /// The fork whose join target is wrong.
        fork: NodeId,
        /// The node referenced as the join target.
        join: NodeId,
    },
    /// A fork's branch has no path to its declared join along `nextSteps`.
    #[error("branch {branch} of fork {fork} cannot reach join {join}")]
    BranchCannotReachJoin {
        /// The fork that declared the join.
        fork: NodeId,
        /// The branch root that cannot reach the join.
        branch: NodeId,
        /// The join target.
        join: NodeId,
    },
    /// A `JOIN` node has fewer than two upstream branches.
    #[error("join {join} has only {upstream_count} upstream branch(es), expected >= 2")]
    JoinUnderArity {
        /// The under-arity join.
        join: NodeId,
        /// How many upstream branches it actually has.
        upstream_count: usize,
    },
    /// A data edge connects to a node whose classification forbids it.
    #[error("node {node} has an incompatible edge: {reason}")]
    EdgeTypeIncompatible {
        /// The offending node.
        node: NodeId,
        /// Why the edge is incompatible.
        reason: String,
    },
}

fn format_ids(ids: &[NodeId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn format_path(path: &[NodeId]) -> String {
    path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Runs the structural checks an [`ExecutionPlan`] must pass before
/// `flowline_execution`'s job compiler can consume it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionPlanValidator {
    config: ValidatorConfig,
}

impl ExecutionPlanValidator {
    /// Create a validator using default (all-permissive) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator with explicit strictness configuration.
    #[must_use]
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Run every check against `plan`, in spec order, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(&self, plan: &ExecutionPlan) -> Result<(), ValidationError> {
        check_non_empty(plan)?;
        check_references(plan)?;
        check_acyclic(plan)?;
        check_reachability(plan)?;
        check_start_cardinality(plan)?;
        check_terminal_presence(plan)?;
        check_fork_well_formed(plan, &self.config)?;
        check_join_well_formed(plan, &self.config)?;
        check_edge_type_compatibility(plan)?;
        Ok(())
    }
}

fn check_non_empty(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    if plan.entry_step_ids.is_empty() || plan.steps.is_empty() {
        return Err(ValidationError::EmptyPlan);
    }
    Ok(())
}

fn check_reference(plan: &ExecutionPlan, node: &NodeId, referenced: &NodeId, field: &'static str) -> Result<(), ValidationError> {
    if plan.steps.contains_key(referenced) {
        Ok(())
    } else {
        Err(ValidationError::UnknownReference {
            node: node.clone(),
            referenced: referenced.clone(),
            field,
        })
    }
}

fn check_references(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    for entry in &plan.entry_step_ids {
        if !plan.steps.contains_key(entry) {
            return Err(ValidationError::UnknownReference {
                node: entry.clone(),
                referenced: entry.clone(),
                field: "entryStepIds",
            });
        }
    }
    for step in plan.steps.values() {
        for next in &step.next_steps {
            check_reference(plan, &step.node_id, next, "nextSteps")?;
        }
        for err in &step.error_steps {
            check_reference(plan, &step.node_id, err, "errorSteps")?;
        }
        for up in &step.upstream_steps {
            check_reference(plan, &step.node_id, up, "upstreamSteps")?;
        }
        if let Some(join) = &step.execution_hints.join_node_id {
            check_reference(plan, &step.node_id, join, "executionHints.joinNodeId")?;
        }
    }
    Ok(())
}

fn adjacency(step: &StepNode) -> impl Iterator<Item = &NodeId> {
    step.next_steps.iter().chain(step.error_steps.iter())
}

/// Build the control-flow graph (`nextSteps` ∪ `errorSteps`) as a
/// `petgraph` map keyed directly by node ID reference, including isolated
/// nodes with no edges so orphan detection still sees them.
fn control_graph(plan: &ExecutionPlan) -> DiGraphMap<&NodeId, ()> {
    let mut graph: DiGraphMap<&NodeId, ()> =
        DiGraphMap::with_capacity(plan.steps.len(), plan.steps.len());
    for id in plan.steps.keys() {
        graph.add_node(id);
    }
    for step in plan.steps.values() {
        for next in adjacency(step) {
            graph.add_edge(&step.node_id, next, ());
        }
    }
    graph
}

fn check_acyclic(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    let graph = control_graph(plan);
    if !is_cyclic_directed(&graph) {
        return Ok(());
    }

    // `is_cyclic_directed` only answers the yes/no question; walk the graph
    // by hand to recover an actual cycle for the error message.
    let mut stack: Vec<&NodeId> = Vec::new();
    let mut on_stack: HashSet<&NodeId> = HashSet::new();
    let mut finished: HashSet<&NodeId> = HashSet::new();

    for start in plan.steps.keys() {
        if finished.contains(start) {
            continue;
        }
        if let Some(cycle) = find_cycle_from(&graph, start, &mut stack, &mut on_stack, &mut finished) {
            return Err(ValidationError::Cycle {
                path: cycle.into_iter().cloned().collect(),
            });
        }
    }

    unreachable!("is_cyclic_directed reported a cycle but none was found while walking")
}

fn find_cycle_from<'a>(
    graph: &DiGraphMap<&'a NodeId, ()>,
    node: &'a NodeId,
    stack: &mut Vec<&'a NodeId>,
    on_stack: &mut HashSet<&'a NodeId>,
    finished: &mut HashSet<&'a NodeId>,
) -> Option<Vec<&'a NodeId>> {
    stack.push(node);
    on_stack.insert(node);

    for next in graph.neighbors(node) {
        if on_stack.contains(next) {
            let start = stack.iter().position(|n| *n == next).unwrap_or(0);
            let mut cycle = stack[start..].to_vec();
            cycle.push(next);
            return Some(cycle);
        }
        if !finished.contains(next) {
            if let Some(cycle) = find_cycle_from(graph, next, stack, on_stack, finished) {
                return Some(cycle);
            }
        }
    }

    stack.pop();
    on_stack.remove(node);
    finished.insert(node);
    None
}

fn check_reachability(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    let graph = control_graph(plan);

    let mut dfs = Dfs::empty(&graph);
    for entry in &plan.entry_step_ids {
        dfs.move_to(entry);
    }
    let mut visited: HashSet<&NodeId> = HashSet::new();
    while let Some(node) = dfs.next(&graph) {
        visited.insert(node);
    }

    let orphans: Vec<NodeId> = plan
        .steps
        .keys()
        .filter(|id| !visited.contains(id))
        .cloned()
        .collect();

    if orphans.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Orphan { nodes: orphans })
    }
}

fn check_start_cardinality(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    let explicit_starts = plan.steps.values().filter(|s| s.kind == StepKind::Start).count();
    if explicit_starts == 1 {
        return Ok(());
    }
    if explicit_starts == 0 && plan.entry_step_ids.len() == 1 {
        return Ok(());
    }
    Err(ValidationError::MissingStart {
        found: explicit_starts.max(plan.entry_step_ids.len()),
    })
}

fn check_terminal_presence(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    let has_terminal = plan
        .steps
        .values()
        .any(|s| s.kind == StepKind::End || s.is_leaf());
    if has_terminal {
        Ok(())
    } else {
        Err(ValidationError::MissingTerminal)
    }
}

/// Whether `to` is reachable from `from` by following `nextSteps` only
/// (data-flow edges, ignoring `errorSteps`) — used to confirm a fork
/// branch actually rejoins its declared join target.
fn reaches_via_next_steps(plan: &ExecutionPlan, from: &NodeId, to: &NodeId) -> bool {
    let mut graph: DiGraphMap<&NodeId, ()> =
        DiGraphMap::with_capacity(plan.steps.len(), plan.steps.len());
    for id in plan.steps.keys() {
        graph.add_node(id);
    }
    for step in plan.steps.values() {
        for next in &step.next_steps {
            graph.add_edge(&step.node_id, next, ());
        }
    }
    from == to || has_path_connecting(&graph, from, to, None)
}

fn check_fork_well_formed(plan: &ExecutionPlan, _config: &ValidatorConfig) -> Result<(), ValidationError> {
    for step in plan.steps.values().filter(|s| s.kind == StepKind::Fork) {
        let Some(join_id) = &step.execution_hints.join_node_id else {
            return Err(ValidationError::ForkMissingJoinId(step.node_id.clone()));
        };

        let join_step = plan.steps.get(join_id);
        let is_join_kind = join_step.is_some_and(|j| j.kind == StepKind::Join);
        if !is_join_kind {
            return Err(ValidationError::JoinKindMismatch {
                fork: step.node_id.clone(),
                join: join_id.clone(),
            });
        }

        for branch in &step.next_steps {
            if !reaches_via_next_steps(plan, branch, join_id) {
                return Err(ValidationError::BranchCannotReachJoin {
                    fork: step.node_id.clone(),
                    branch: branch.clone(),
                    join: join_id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_join_well_formed(plan: &ExecutionPlan, config: &ValidatorConfig) -> Result<(), ValidationError> {
    for step in plan.steps.values().filter(|s| s.kind == StepKind::Join) {
        if step.upstream_steps.len() < 2 {
            return Err(ValidationError::JoinUnderArity {
                join: step.node_id.clone(),
                upstream_count: step.upstream_steps.len(),
            });
        }

        if config.strict_join_upstreams {
            let declaring_fork = plan.steps.values().find(|s| {
                s.kind == StepKind::Fork && s.execution_hints.join_node_id.as_ref() == Some(&step.node_id)
            });
            if let Some(fork) = declaring_fork {
                for upstream in &step.upstream_steps {
                    let on_a_branch = fork
                        .next_steps
                        .iter()
                        .any(|branch| branch == upstream || reaches_via_next_steps(plan, branch, upstream));
                    if !on_a_branch {
                        return Err(ValidationError::BranchCannotReachJoin {
                            fork: fork.node_id.clone(),
                            branch: upstream.clone(),
                            join: step.node_id.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_edge_type_compatibility(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    for step in plan.steps.values() {
        match step.classification {
            StepClassification::Source if !step.upstream_steps.is_empty() => {
                return Err(ValidationError::EdgeTypeIncompatible {
                    node: step.node_id.clone(),
                    reason: "SOURCE node has incoming data edges".into(),
                });
            }
            StepClassification::Sink if !step.next_steps.is_empty() => {
                return Err(ValidationError::EdgeTypeIncompatible {
                    node: step.node_id.clone(),
                    reason: "SINK node has outgoing data edges".into(),
                });
            }
            _ => {}
        }

        if CONTROL_ONLY_NODE_TYPES.contains(&step.node_type.as_str())
            && (!step.upstream_steps.is_empty() || !step.next_steps.is_empty())
        {
            return Err(ValidationError::EdgeTypeIncompatible {
                node: step.node_id.clone(),
                reason: format!("control-only node type {:?} has data edges", step.node_type),
            });
        }
    }
    Ok(())
}
