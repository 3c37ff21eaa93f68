//! Translates a [`WorkflowDefinition`] into a flat [`ExecutionPlan`].

use std::collections::{HashMap, HashSet};

use flowline_core::NodeId;
use indexmap::IndexMap;
use thiserror::Error;

use crate::definition::{RawEdge, RawNode, WorkflowDefinition};
use crate::model::{
    ExecutionHints, ExecutionMode, ExecutionPlan, FailurePolicy, StepClassification, StepKind,
    StepNode,
};

/// Node config fields that are logically lists but may arrive as a
/// comma-separated string from editors that only support scalar inputs.
const CSV_LIST_FIELDS: &[&str] = &["leftKeys", "rightKeys"];

/// Errors that can occur while building an [`ExecutionPlan`] from a
/// [`WorkflowDefinition`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlanBuildError {
    /// The definition is structurally invalid independent of node types.
    #[error("malformed workflow definition: {0}")]
    MalformedDefinition(String),
    /// A node has no resolvable executor key.
    #[error("node {0:?} has no resolvable node type")]
    UnknownNodeType(String),
    /// Two nodes declared the same ID.
    #[error("duplicate node id: {0:?}")]
    DuplicateId(String),
}

/// Splits a comma-separated string config field into a JSON array of
/// trimmed strings. Non-string values and unknown field names pass through
/// unchanged.
pub fn split_csv_field(value: &serde_json::Value) -> serde_json::Value {
    match value.as_str() {
        Some(s) if s.contains(',') => {
            let items: Vec<serde_json::Value> = s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| serde_json::Value::String(s.to_owned()))
                .collect();
            serde_json::Value::Array(items)
        }
        _ => value.clone(),
    }
}

/// Resolves a raw node's executor key from `node.type` or `node.data.nodeType`.
#[must_use]
pub fn normalize_node_type(node: &RawNode) -> Option<String> {
    node.node_type
        .clone()
        .or_else(|| node.data.as_ref().and_then(|d| d.node_type.clone()))
}

fn normalize_config(mut config: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut config {
        for field in CSV_LIST_FIELDS {
            if let Some(value) = map.get(*field) {
                let normalized = split_csv_field(value);
                map.insert((*field).to_owned(), normalized);
            }
        }
    }
    config
}

/// Builds [`ExecutionPlan`]s from [`WorkflowDefinition`]s.
///
/// Stateless: constructed once and reused across builds, like
/// `flowline_action::registry::ExecutorRegistry` is constructed once and
/// passed by reference.
#[derive(Debug, Default)]
pub struct PlanBuilder;

impl PlanBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build an [`ExecutionPlan`] from a [`WorkflowDefinition`].
    ///
    /// # Errors
    ///
    /// Returns [`PlanBuildError`] if the definition is malformed, a node has
    /// no resolvable type, or two nodes share an ID.
    pub fn build(&self, definition: &WorkflowDefinition) -> Result<ExecutionPlan, PlanBuildError> {
        if definition.nodes.is_empty() {
            return Err(PlanBuildError::MalformedDefinition(
                "workflow has no nodes".into(),
            ));
        }

        let mut seen_ids = HashSet::with_capacity(definition.nodes.len());
        for raw in &definition.nodes {
            if raw.id.is_empty() {
                return Err(PlanBuildError::MalformedDefinition(
                    "node id must be non-empty".into(),
                ));
            }
            if !seen_ids.insert(raw.id.clone()) {
                return Err(PlanBuildError::DuplicateId(raw.id.clone()));
            }
        }

        for edge in &definition.edges {
            if !seen_ids.contains(&edge.source) || !seen_ids.contains(&edge.target) {
                return Err(PlanBuildError::MalformedDefinition(format!(
                    "edge {} -> {} references an unknown node",
                    edge.source, edge.target
                )));
            }
        }

        let data_edges: Vec<&RawEdge> = definition.edges.iter().filter(|e| !e.is_control).collect();
        let control_edges: Vec<&RawEdge> = definition.edges.iter().filter(|e| e.is_control).collect();

        let mut next_by_node: HashMap<&str, Vec<String>> = HashMap::new();
        let mut upstream_by_node: HashMap<&str, Vec<String>> = HashMap::new();
        for edge in &data_edges {
            next_by_node
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.clone());
            upstream_by_node
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.clone());
        }

        let mut error_by_node: HashMap<&str, Vec<String>> = HashMap::new();
        for edge in &control_edges {
            error_by_node
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.clone());
        }

        let mut steps = IndexMap::with_capacity(definition.nodes.len());
        let mut entry_ids = Vec::new();

        for raw in &definition.nodes {
            let node_id = NodeId::new(raw.id.clone())
                .map_err(|e| PlanBuildError::MalformedDefinition(e.to_string()))?;

            let node_type = normalize_node_type(raw)
                .ok_or_else(|| PlanBuildError::UnknownNodeType(raw.id.clone()))?;

            let next_steps = next_by_node
                .get(raw.id.as_str())
                .into_iter()
                .flatten()
                .map(|id| NodeId::new(id.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PlanBuildError::MalformedDefinition(e.to_string()))?;

            let mut error_steps = error_by_node
                .get(raw.id.as_str())
                .into_iter()
                .flatten()
                .map(|id| NodeId::new(id.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PlanBuildError::MalformedDefinition(e.to_string()))?;

            let upstream_steps = upstream_by_node
                .get(raw.id.as_str())
                .into_iter()
                .flatten()
                .map(|id| NodeId::new(id.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PlanBuildError::MalformedDefinition(e.to_string()))?;

            let execution_hints = ExecutionHints {
                mode: raw.execution_hints.mode,
                chunk_size: raw.execution_hints.chunk_size,
                partition_count: raw.execution_hints.partition_count,
                max_retries: raw.execution_hints.max_retries,
                timeout_ms: raw.execution_hints.timeout_ms,
                join_node_id: raw
                    .execution_hints
                    .join_node_id
                    .as_ref()
                    .map(|id| NodeId::new(id.clone()))
                    .transpose()
                    .map_err(|e| PlanBuildError::MalformedDefinition(e.to_string()))?,
            };

            let exception_handling = match &raw.on_failure {
                Some(policy) => FailurePolicy {
                    action: policy.action,
                    max_retries: policy.max_retries.unwrap_or(3),
                    retry_delay_ms: policy.retry_delay_ms.unwrap_or(1000),
                    route_to_node: policy
                        .route_to_node
                        .as_ref()
                        .map(|id| NodeId::new(id.clone()))
                        .transpose()
                        .map_err(|e| PlanBuildError::MalformedDefinition(e.to_string()))?,
                    skip_on_error: policy.skip_on_error,
                },
                None => FailurePolicy::default(),
            };

            if exception_handling.action == crate::model::FailureAction::Route {
                if let Some(route) = exception_handling.route_to_node.clone() {
                    if !error_steps.contains(&route) {
                        error_steps.push(route);
                    }
                }
            }

            let kind = raw.kind.unwrap_or_else(|| {
                infer_kind(
                    &node_type,
                    next_steps.len(),
                    upstream_steps.len(),
                    execution_hints.mode,
                )
            });

            let classification = raw.classification.unwrap_or(StepClassification::Transform);

            let step = StepNode {
                node_id: node_id.clone(),
                node_type,
                config: normalize_config(raw.config.clone()),
                next_steps,
                error_steps,
                metrics: raw.metrics.unwrap_or_default(),
                exception_handling,
                execution_hints,
                classification,
                output_ports: raw.output_ports.clone(),
                kind,
                upstream_steps,
            };

            if step.upstream_steps.is_empty() {
                entry_ids.push(node_id.clone());
            }

            steps.insert(node_id, step);
        }

        Ok(ExecutionPlan {
            entry_step_ids: entry_ids,
            steps,
            workflow_id: definition.workflow_id,
        })
    }
}

fn infer_kind(
    node_type: &str,
    outgoing_count: usize,
    incoming_count: usize,
    mode: Option<ExecutionMode>,
) -> StepKind {
    if incoming_count == 0 {
        return StepKind::Start;
    }
    if outgoing_count == 0 && node_type.eq_ignore_ascii_case("end") {
        return StepKind::End;
    }
    if outgoing_count >= 2 && mode == Some(ExecutionMode::Parallel) {
        return StepKind::Fork;
    }
    if incoming_count >= 2 {
        return StepKind::Join;
    }
    StepKind::Normal
}
