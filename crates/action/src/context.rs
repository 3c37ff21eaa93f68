use std::sync::Arc;

use flowline_core::{ExecutionId, NodeId, WorkflowId};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::ActionError;

/// Runtime context handed to an [`crate::executor::Executor`] on every call.
///
/// Constructed by `flowline_execution`'s runtime before invoking an executor.
/// Carries identity (which execution, workflow, and node this step belongs
/// to), workflow-scoped variables, and a cancellation signal.
///
/// Executors **must** periodically call
/// [`check_cancelled`](Self::check_cancelled) in long-running loops to
/// support cooperative cancellation.
#[non_exhaustive]
pub struct ExecutorContext {
    /// The execution this step is running as part of.
    pub execution_id: ExecutionId,
    /// The step being executed.
    pub node_id: NodeId,
    /// The workflow this execution belongs to.
    pub workflow_id: WorkflowId,
    /// Cancellation signal, checked cooperatively by executors.
    pub cancellation: CancellationToken,
    variables: Arc<RwLock<serde_json::Map<String, serde_json::Value>>>,
}

impl ExecutorContext {
    /// Create a new context with the given identifiers and no pre-populated
    /// variables.
    #[must_use]
    pub fn new(execution_id: ExecutionId, node_id: NodeId, workflow_id: WorkflowId) -> Self {
        Self {
            execution_id,
            node_id,
            workflow_id,
            cancellation: CancellationToken::new(),
            variables: Arc::new(RwLock::new(serde_json::Map::new())),
        }
    }

    /// Attach a cancellation token, replacing the freshly-created default.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Pre-populate workflow-scoped variables.
    #[must_use]
    pub fn with_variables(mut self, vars: serde_json::Map<String, serde_json::Value>) -> Self {
        self.variables = Arc::new(RwLock::new(vars));
        self
    }

    /// Read a variable from the workflow scope.
    #[must_use]
    pub fn get_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.variables.read().get(key).cloned()
    }

    /// Write a variable to the workflow scope, overwriting any existing value.
    pub fn set_variable(&self, key: &str, value: serde_json::Value) {
        self.variables.write().insert(key.to_owned(), value);
    }

    /// Remove a variable from the workflow scope, returning its prior value.
    pub fn remove_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.variables.write().remove(key)
    }

    /// Check whether execution has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Cancelled`] if the token has been triggered.
    pub fn check_cancelled(&self) -> Result<(), ActionError> {
        if self.cancellation.is_cancelled() {
            Err(ActionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit a structured debug event tagged with this context's identity.
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }

    /// Emit a structured info event tagged with this context's identity.
    pub fn log_info(&self, message: &str) {
        tracing::info!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }

    /// Emit a structured warning event tagged with this context's identity.
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }

    /// Emit a structured error event tagged with this context's identity.
    pub fn log_error(&self, message: &str) {
        tracing::error!(execution_id = %self.execution_id, node_id = %self.node_id, message);
    }
}

impl std::fmt::Debug for ExecutorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorContext")
            .field("execution_id", &self.execution_id)
            .field("node_id", &self.node_id)
            .field("workflow_id", &self.workflow_id)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> ExecutorContext {
        ExecutorContext::new(
            ExecutionId::v4(),
            NodeId::new("step-1").unwrap(),
            WorkflowId::v4(),
        )
    }

    #[test]
    fn get_set_variable() {
        let ctx = test_context();
        assert!(ctx.get_variable("count").is_none());
        ctx.set_variable("count", serde_json::json!(42));
        assert_eq!(ctx.get_variable("count"), Some(serde_json::json!(42)));
    }

    #[test]
    fn overwrite_variable() {
        let ctx = test_context();
        ctx.set_variable("name", serde_json::json!("alice"));
        ctx.set_variable("name", serde_json::json!("bob"));
        assert_eq!(ctx.get_variable("name"), Some(serde_json::json!("bob")));
    }

    #[test]
    fn remove_variable() {
        let ctx = test_context();
        ctx.set_variable("temp", serde_json::json!(true));
        let old = ctx.remove_variable("temp");
        assert_eq!(old, Some(serde_json::json!(true)));
        assert!(ctx.get_variable("temp").is_none());
    }

    #[test]
    fn check_cancelled_ok() {
        let ctx = test_context();
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn check_cancelled_after_cancel() {
        let ctx = test_context();
        ctx.cancellation.cancel();
        let err = ctx.check_cancelled().unwrap_err();
        assert!(matches!(err, ActionError::Cancelled));
    }

    #[test]
    fn with_cancellation_token() {
        let token = CancellationToken::new();
        let child = token.child_token();
        let ctx = test_context().with_cancellation(child);
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(ctx.check_cancelled().is_err());
    }

    #[test]
    fn with_variables() {
        let mut vars = serde_json::Map::new();
        vars.insert("preset".into(), serde_json::json!("value"));
        let ctx = test_context().with_variables(vars);
        assert_eq!(ctx.get_variable("preset"), Some(serde_json::json!("value")));
    }

    #[test]
    fn debug_format() {
        let ctx = test_context();
        let debug = format!("{ctx:?}");
        assert!(debug.contains("ExecutorContext"));
        assert!(debug.contains("execution_id"));
    }
}
