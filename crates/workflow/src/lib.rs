//! Workflow definition, DAG graph, and validation for the Flowline workflow
//! engine.
//!
//! This crate turns a user-authored [`definition::WorkflowDefinition`] into a
//! validated, flattened [`model::ExecutionPlan`] that
//! `flowline_execution`'s job compiler can schedule:
//!
//! 1. [`builder::PlanBuilder`] resolves node types, infers structural kinds,
//!    and normalizes edges into `nextSteps`/`errorSteps`/`upstreamSteps`.
//! 2. [`expander::SubgraphExpander`] inlines `SUBGRAPH` nodes against a
//!    [`expander::SubgraphTemplateRegistry`], bounded by a recursion depth.
//! 3. [`validator::ExecutionPlanValidator`] checks the result is acyclic,
//!    fully reachable, and has well-formed fork/join pairs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod definition;
pub mod expander;
pub mod model;
pub mod validator;

pub use builder::{PlanBuildError, PlanBuilder};
pub use definition::{RawEdge, RawExecutionHints, RawFailurePolicy, RawNode, RawNodeData, WorkflowDefinition};
pub use expander::{
    SubgraphDefinition, SubgraphExpander, SubgraphExpansionError, SubgraphTemplateRegistry,
    DEFAULT_MAX_EXPANSION_DEPTH,
};
pub use model::{
    ExecutionHints, ExecutionMode, ExecutionPlan, FailureAction, FailurePolicy, MetricsFlags,
    StepClassification, StepKind, StepNode, WorkflowErrorPolicy,
};
pub use validator::{ExecutionPlanValidator, ValidationError, ValidatorConfig};
