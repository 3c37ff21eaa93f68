//! Inlines `SUBGRAPH` nodes by instantiating registered or inline templates.

use std::collections::HashMap;

use flowline_core::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ExecutionPlan, StepKind, StepNode};

/// A reusable group of steps that can be inlined wherever a `SUBGRAPH` node
/// references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphDefinition {
    /// Steps belonging to this template, in declaration order.
    pub steps: Vec<StepNode>,
    /// Steps within the template that data may enter at.
    pub entry_points: Vec<NodeId>,
    /// The single step flow leaves the template from.
    pub exit_point: NodeId,
}

/// A registry of named [`SubgraphDefinition`]s, constructed once at startup
/// and passed by reference — the same collaborator shape as
/// `flowline_action::registry::ExecutorRegistry`.
#[derive(Debug, Default)]
pub struct SubgraphTemplateRegistry {
    templates: HashMap<String, SubgraphDefinition>,
}

impl SubgraphTemplateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under `id`, replacing any prior template with the
    /// same ID.
    pub fn register(&mut self, id: impl Into<String>, template: SubgraphDefinition) {
        self.templates.insert(id.into(), template);
    }

    /// Look up a registered template by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SubgraphDefinition> {
        self.templates.get(id)
    }

    /// Whether a template is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry has no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Default recursion bound for nested subgraph expansion.
pub const DEFAULT_MAX_EXPANSION_DEPTH: u32 = 10;

/// Errors that can occur while expanding `SUBGRAPH` nodes.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum SubgraphExpansionError {
    /// `config.subgraphId` / `config.templateId` named a template that is
    /// not registered.
    #[error("node {node:?} references unresolved subgraph template {template:?}")]
    UnresolvedTemplate {
        /// The `SUBGRAPH` node that referenced the missing template.
        node: NodeId,
        /// The template ID that could not be resolved.
        template: String,
    },
    /// `config.inlineSteps` could not be parsed as a [`SubgraphDefinition`].
    #[error("node {node:?} has a malformed inline subgraph definition: {reason}")]
    MalformedInline {
        /// The `SUBGRAPH` node with the malformed inline definition.
        node: NodeId,
        /// Why parsing failed.
        reason: String,
    },
    /// A node has no `subgraphId`, `templateId`, or `inlineSteps` to resolve.
    #[error("node {0:?} does not reference any subgraph template")]
    MissingReference(NodeId),
    /// Recursive expansion exceeded `maxExpansionDepth`.
    #[error("subgraph expansion exceeded max depth {max_depth}")]
    CircularReference {
        /// The configured recursion bound that was exceeded.
        max_depth: u32,
    },
}

/// Expands `SUBGRAPH` nodes in a plan into their referenced templates.
///
/// Cyclic subgraph references are prevented by a depth counter rather than a
/// visited set, matching how the source system guards against them.
#[derive(Debug, Clone, Copy)]
pub struct SubgraphExpander {
    max_expansion_depth: u32,
}

impl Default for SubgraphExpander {
    fn default() -> Self {
        Self {
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }
}

impl SubgraphExpander {
    /// Create an expander with the default recursion bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an expander with a custom recursion bound.
    #[must_use]
    pub fn with_max_expansion_depth(max_expansion_depth: u32) -> Self {
        Self { max_expansion_depth }
    }

    /// Expand every `SUBGRAPH` node in `plan`, recursively, until none remain.
    ///
    /// # Errors
    ///
    /// Returns [`SubgraphExpansionError`] if a template cannot be resolved,
    /// an inline definition is malformed, or expansion recurses past
    /// `maxExpansionDepth`.
    pub fn expand(
        &self,
        plan: ExecutionPlan,
        registry: &SubgraphTemplateRegistry,
    ) -> Result<ExecutionPlan, SubgraphExpansionError> {
        self.expand_at_depth(plan, registry, 0)
    }

    fn expand_at_depth(
        &self,
        mut plan: ExecutionPlan,
        registry: &SubgraphTemplateRegistry,
        depth: u32,
    ) -> Result<ExecutionPlan, SubgraphExpansionError> {
        let subgraph_ids: Vec<NodeId> = plan
            .steps
            .iter()
            .filter(|(_, step)| step.kind == StepKind::Subgraph)
            .map(|(id, _)| id.clone())
            .collect();

        if subgraph_ids.is_empty() {
            return Ok(plan);
        }

        if depth >= self.max_expansion_depth {
            return Err(SubgraphExpansionError::CircularReference {
                max_depth: self.max_expansion_depth,
            });
        }

        for subgraph_id in subgraph_ids {
            let node = plan.steps.get(&subgraph_id).expect("just collected").clone();
            let template = self.resolve_template(&node, registry)?;
            plan = inline_template(plan, &node, &template);
        }

        self.expand_at_depth(plan, registry, depth + 1)
    }

    fn resolve_template(
        &self,
        node: &StepNode,
        registry: &SubgraphTemplateRegistry,
    ) -> Result<SubgraphDefinition, SubgraphExpansionError> {
        let config = node.config.as_object();

        if let Some(template_id) = config
            .and_then(|c| c.get("subgraphId").or_else(|| c.get("templateId")))
            .and_then(serde_json::Value::as_str)
        {
            return registry.get(template_id).cloned().ok_or_else(|| {
                SubgraphExpansionError::UnresolvedTemplate {
                    node: node.node_id.clone(),
                    template: template_id.to_owned(),
                }
            });
        }

        if let Some(inline) = config.and_then(|c| c.get("inlineSteps")) {
            return serde_json::from_value(inline.clone()).map_err(|e| {
                SubgraphExpansionError::MalformedInline {
                    node: node.node_id.clone(),
                    reason: e.to_string(),
                }
            });
        }

        Err(SubgraphExpansionError::MissingReference(node.node_id.clone()))
    }
}

fn inline_template(mut plan: ExecutionPlan, subgraph_node: &StepNode, template: &SubgraphDefinition) -> ExecutionPlan {
    let prefix = subgraph_node.node_id.as_str();
    let rename: IndexMap<NodeId, NodeId> = template
        .steps
        .iter()
        .map(|s| (s.node_id.clone(), s.node_id.prefixed(prefix)))
        .collect();

    let remap = |id: &NodeId| rename.get(id).cloned().unwrap_or_else(|| id.clone());

    let remapped_exit = remap(&template.exit_point);

    let mut inlined_steps: Vec<StepNode> = template
        .steps
        .iter()
        .map(|step| {
            let mut s = step.clone();
            s.node_id = remap(&s.node_id);
            s.next_steps = s.next_steps.iter().map(remap).collect();
            s.error_steps = s.error_steps.iter().map(remap).collect();
            s.upstream_steps = s.upstream_steps.iter().map(remap).collect();
            s.execution_hints.join_node_id = s.execution_hints.join_node_id.as_ref().map(remap);
            s
        })
        .collect();

    for step in &mut inlined_steps {
        if step.node_id == remapped_exit {
            step.next_steps.extend(subgraph_node.next_steps.iter().cloned());
        }
    }

    plan.steps.shift_remove(&subgraph_node.node_id);

    for step in &mut plan.steps.values_mut() {
        for next in &mut step.next_steps {
            if *next == subgraph_node.node_id {
                *next = remapped_exit.clone();
            }
        }
        for err in &mut step.error_steps {
            if *err == subgraph_node.node_id {
                *err = remapped_exit.clone();
            }
        }
    }

    for id in &mut plan.entry_step_ids {
        if *id == subgraph_node.node_id {
            *id = remapped_exit.clone();
        }
    }

    for step in inlined_steps {
        plan.steps.insert(step.node_id.clone(), step);
    }

    plan
}
