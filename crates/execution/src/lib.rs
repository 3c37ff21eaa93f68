#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]
#![warn(missing_docs)]

//! # Flowline Execution
//!
//! Failure policy, job compilation, and the fork/join execution runtime for
//! the Flowline workflow engine.
//!
//! This crate turns a validated [`flowline_workflow::ExecutionPlan`] into a
//! runnable job and executes it:
//!
//! - [`failure`] — the pure `(policy, attempt, failure) → decision` engine
//!   and the workflow-level disposition it escalates to.
//! - [`compiler`] — [`compiler::JobCompiler`], which walks a validated plan
//!   and emits a [`compiler::CompiledJob`] of sequential, fork, and barrier
//!   steps.
//! - [`runtime`] — [`runtime::ExecutionRuntime`], which runs a compiled job
//!   against a shared worker pool with diagnostic context propagation and
//!   persistence hooks.
//! - [`repository`] — the [`repository::ExecutionRepository`] persistence
//!   boundary, plus an in-memory double for tests.
//! - [`config`] — [`config::OrchestratorConfig`], the pool-sizing and
//!   validator-strictness surface.
//! - [`status`], [`transition`] — the node/job status vocabularies and the
//!   state machine transitions allowed between them.
//! - [`attempt`], [`state`], [`journal`] — per-node attempt history, the
//!   in-memory execution state the runtime mutates as it runs, and the
//!   audit-log shape persisted via [`repository::ExecutionRepository`].

pub mod attempt;
pub mod compiler;
pub mod config;
pub mod error;
pub mod failure;
pub mod journal;
pub mod repository;
pub mod runtime;
pub mod state;
pub mod status;
pub mod transition;

pub use attempt::NodeAttempt;
pub use compiler::{CompiledJob, CompiledStep, JobCompiler};
pub use config::OrchestratorConfig;
pub use error::{CompilationError, RuntimeError};
pub use failure::{FailureDecision, JobDisposition};
pub use journal::JournalEntry;
pub use repository::{ExecutionRepository, LogRecord, RepositoryError};
pub use runtime::{DiagnosticContext, ExecutionRuntime};
pub use state::{JobExecutionState, NodeExecutionState};
pub use status::{JobStatus, NodeStatus};

/// Serde helper for `Option<Duration>` serialized as milliseconds.
pub(crate) mod serde_duration_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize an `Option<Duration>` as an optional integer of milliseconds.
    pub fn serialize<S: Serializer>(duration: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(s),
            None => s.serialize_none(),
        }
    }

    /// Deserialize an optional integer of milliseconds into `Option<Duration>`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let opt: Option<u64> = Option::deserialize(d)?;
        Ok(opt.map(Duration::from_millis))
    }
}
