//! Turns a validated [`ExecutionPlan`] into an executable job graph.
//!
//! The compiler assumes the plan it receives already satisfies every
//! invariant checked by the validator (reference integrity, acyclicity,
//! fork/join well-formedness); it does no re-validation of its own.

use std::collections::HashMap;

use flowline_core::NodeId;
use flowline_workflow::{ExecutionPlan, StepKind, StepNode};
use indexmap::IndexMap;

use crate::error::CompilationError;

/// One compiled step in a [`CompiledJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledStep {
    /// A single step chained to its successors by ordinary completion.
    Sequential,
    /// A fork: each branch is an independent sequential sub-plan running
    /// from its root up to (but excluding) `join`.
    ParallelFork {
        /// One entry per branch, each a root-to-join chain of node IDs.
        branches: Vec<Vec<NodeId>>,
        /// The join node all branches converge on.
        join: NodeId,
    },
    /// A join: blocks until every branch named in `upstream_branches`
    /// reports completion.
    Barrier {
        /// The owning fork's branch-root IDs (not the join's immediate
        /// graph predecessors — the barrier tracks branches by their
        /// starting node, matching how the runtime submits them).
        upstream_branches: Vec<NodeId>,
    },
}

/// An executable job graph produced from a validated [`ExecutionPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledJob {
    /// `"workflow-<workflowId>"`; identical inputs produce identical names.
    pub name: String,
    /// Every step in the job, keyed by node ID, in plan order.
    pub steps: IndexMap<NodeId, CompiledStep>,
    /// The job's entry node IDs, copied from the plan's entry points.
    pub entry: Vec<NodeId>,
}

/// Compiles a validated [`ExecutionPlan`] into a [`CompiledJob`].
///
/// Stateless by design — the registry/template collaborators this engine
/// depends on elsewhere are constructed once at startup and passed by
/// reference, not looked up from global state.
#[derive(Debug, Default, Clone, Copy)]
pub struct JobCompiler;

impl JobCompiler {
    /// Compile `plan` into a job ready for the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CompilationError::UnsupportedNodeKind`] if the plan still
    /// contains a `Decision` or `Subgraph` step — both must have been
    /// resolved (rejected or expanded) before reaching this stage.
    pub fn compile(plan: &ExecutionPlan) -> Result<CompiledJob, CompilationError> {
        let fork_branches = Self::fork_branches_by_join(plan);

        let mut steps = IndexMap::with_capacity(plan.steps.len());
        for (id, step) in &plan.steps {
            let compiled = match step.kind {
                StepKind::Decision | StepKind::Subgraph => {
                    return Err(CompilationError::UnsupportedNodeKind {
                        node: id.clone(),
                        kind: step.kind,
                    });
                }
                StepKind::Fork => Self::compile_fork(plan, step),
                StepKind::Join => CompiledStep::Barrier {
                    upstream_branches: fork_branches
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| step.upstream_steps.clone()),
                },
                StepKind::Normal | StepKind::Start | StepKind::End => CompiledStep::Sequential,
            };
            steps.insert(id.clone(), compiled);
        }

        Ok(CompiledJob {
            name: Self::job_name(plan),
            steps,
            entry: plan.entry_step_ids.clone(),
        })
    }

    fn job_name(plan: &ExecutionPlan) -> String {
        match &plan.workflow_id {
            Some(id) => format!("workflow-{id}"),
            None => "workflow-unspecified".to_string(),
        }
    }

    /// Map every join's ID to the branch-root IDs of the fork that targets
    /// it, so the barrier step can be built without re-deriving the fork
    /// while iterating the join itself.
    fn fork_branches_by_join(plan: &ExecutionPlan) -> HashMap<NodeId, Vec<NodeId>> {
        plan.steps
            .values()
            .filter(|step| step.kind == StepKind::Fork)
            .filter_map(|fork| {
                fork.execution_hints
                    .join_node_id
                    .clone()
                    .map(|join| (join, fork.next_steps.clone()))
            })
            .collect()
    }

    fn compile_fork(plan: &ExecutionPlan, fork: &StepNode) -> CompiledStep {
        let join = fork
            .execution_hints
            .join_node_id
            .clone()
            .expect("validator rejects a Fork with no joinNodeId before compilation");

        let branches = fork
            .next_steps
            .iter()
            .map(|root| Self::trace_branch(plan, root, &join))
            .collect();

        CompiledStep::ParallelFork { branches, join }
    }

    /// Walk `nextSteps` from `root` up to (exclusive of) `join`, collecting
    /// the chain of node IDs that make up one branch.
    fn trace_branch(plan: &ExecutionPlan, root: &NodeId, join: &NodeId) -> Vec<NodeId> {
        let mut branch = Vec::new();
        let mut current = root.clone();
        loop {
            if &current == join {
                break;
            }
            branch.push(current.clone());
            let Some(step) = plan.step(&current) else {
                break;
            };
            let Some(next) = step.next_steps.first() else {
                break;
            };
            current = next.clone();
        }
        branch
    }
}
