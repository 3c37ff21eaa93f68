//! Crate-wide error type for `flowline-core`.

use thiserror::Error;

use crate::id::NodeIdError;

/// Errors produced by the core identifier types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A `NodeId` failed validation.
    #[error("invalid node id: {0}")]
    InvalidNodeId(#[from] NodeIdError),
}
