//! Identifiers for the entities the orchestration engine reasons about.
//!
//! System-generated identifiers (workflows, executions, actions) use
//! [`domain_key`]'s `Uuid<D>` wrapper — `Copy`, 16 bytes, with `v4()`/`nil()`/
//! `parse()` and full serde support. `NodeId` is deliberately not one of
//! these: node IDs are chosen by whoever authors a workflow, not generated by
//! the system, so it is a validated string newtype instead.

use std::fmt;
use std::str::FromStr;

use domain_key::define_uuid;
use serde::{Deserialize, Serialize};

pub use domain_key::UuidParseError;

define_uuid!(pub WorkflowIdDomain => WorkflowId);
define_uuid!(pub ExecutionIdDomain => ExecutionId);
define_uuid!(pub ActionIdDomain => ActionId);

/// Error returned when a candidate string cannot be used as a [`NodeId`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NodeIdError {
    /// The candidate string was empty.
    #[error("node id must be non-empty")]
    Empty,
}

/// A user-chosen, non-empty identifier for a node in a workflow graph.
///
/// Unlike [`WorkflowId`] or [`ExecutionId`], a `NodeId` is never generated —
/// workflow authors pick these themselves (`"start"`, `"filter"`, `"join"`),
/// so the type is a validated `String` rather than a UUID wrapper.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Construct a `NodeId`, rejecting an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`NodeIdError::Empty`] if `value` is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, NodeIdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NodeIdError::Empty);
        }
        Ok(Self(value))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Produce a new `NodeId` by prefixing this one, used by subgraph
    /// expansion to namespace inlined node IDs (`"<subgraph>_<inner>"`).
    #[must_use]
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self(format!("{prefix}_{}", self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn workflow_id_v4_creates_non_nil_uuid() {
        let id = WorkflowId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn execution_id_v4_creates_non_nil_uuid() {
        let id = ExecutionId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn node_id_rejects_empty_string() {
        assert_eq!(NodeId::new(""), Err(NodeIdError::Empty));
    }

    #[test]
    fn node_id_accepts_non_empty_string() {
        let id = NodeId::new("start").unwrap();
        assert_eq!(id.as_str(), "start");
    }

    #[test]
    fn node_id_display_matches_input() {
        let id = NodeId::new("join-a").unwrap();
        assert_eq!(id.to_string(), "join-a");
    }

    #[test]
    fn node_id_prefixed_namespaces_the_id() {
        let id = NodeId::new("inner").unwrap();
        assert_eq!(id.prefixed("sub1").as_str(), "sub1_inner");
    }

    #[test]
    fn node_id_try_from_str() {
        let id: NodeId = "a".try_into().unwrap();
        assert_eq!(id.as_str(), "a");
        let err: Result<NodeId, _> = "".try_into();
        assert!(err.is_err());
    }

    #[test]
    fn node_id_ordering_is_lexicographic() {
        let a = NodeId::new("a").unwrap();
        let b = NodeId::new("b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn node_id_serde_roundtrip() {
        let id = NodeId::new("n1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"n1\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn workflow_id_serde_roundtrip() {
        let id = WorkflowId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: WorkflowId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn different_id_types_are_incompatible() {
        fn accepts_workflow(_id: WorkflowId) {}
        fn accepts_execution(_id: ExecutionId) {}

        accepts_workflow(WorkflowId::v4());
        accepts_execution(ExecutionId::v4());
        // accepts_workflow(ExecutionId::v4()); // would not compile
    }
}
