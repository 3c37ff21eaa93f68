//! Executor contract and executor registry for the Flowline workflow engine.
//!
//! This crate defines **what** an executor is and **how it communicates**
//! with the engine; it does not decide how the engine schedules or retries
//! executor calls — that lives in `flowline_execution`.
//!
//! ## Core Types
//!
//! - [`Executor`] — the single-operation trait every node type implements.
//! - [`ExecutorContext`] — per-call runtime context (identity, variables,
//!   cancellation).
//! - [`ExecutorOutcome`] — exit status plus read/write/skip counters.
//! - [`ActionError`] — the executor's own account of a failure.
//! - [`ExecutorRegistry`] — keyed lookup of node type → executor, with a
//!   startup compatibility check against the known node-type catalog.
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use flowline_action::{Executor, ExecutorContext, ExecutorOutcome};
//! use flowline_workflow::StepNode;
//!
//! struct NoOp;
//!
//! #[async_trait]
//! impl Executor for NoOp {
//!     fn key(&self) -> &str { "NoOp" }
//!
//!     async fn execute(&self, ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
//!         ctx.check_cancelled().map_or_else(ExecutorOutcome::stopped, |()| ExecutorOutcome::success(0, 0))
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Runtime context provided to an executor during a call.
pub mod context;
/// Error type reported by executors through an [`outcome::ExecutorOutcome`].
pub mod error;
/// The single-operation `Executor` trait.
pub mod executor;
/// Exit status and counters carried back from an executor call.
pub mod outcome;
/// Keyed lookup of node type to executor implementation.
pub mod registry;

pub use context::ExecutorContext;
pub use error::ActionError;
pub use executor::Executor;
pub use outcome::{ExecutorOutcome, ExecutorStatus};
pub use registry::{CompatibilityError, ExecutorRegistry};
