//! # flowline-core
//!
//! Identifier types shared by every crate in the flowline workflow engine.
//!
//! - [`WorkflowId`], [`ExecutionId`], [`ActionId`] — system-generated UUID
//!   identifiers.
//! - [`NodeId`] — a user-chosen, non-empty string identifier for a node
//!   inside a workflow graph.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;

pub use error::CoreError;
pub use id::{ActionId, ExecutionId, NodeId, NodeIdError, UuidParseError, WorkflowId};

/// Result type used throughout flowline crates that only need `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
