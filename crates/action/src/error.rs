use thiserror::Error;

/// Error reported by an [`crate::executor::Executor`] through an
/// [`crate::outcome::ExecutorOutcome`].
///
/// Distinct from `flowline_execution::RuntimeError`: this is the executor's
/// own account of what went wrong; the runtime wraps it via
/// `RuntimeError::ExecutorFailure` before handing it to the failure policy
/// engine.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// The executor's work failed.
    #[error("{message}")]
    Failed {
        /// Human-readable failure message.
        message: String,
        /// Optional structured details about the failure.
        details: Option<serde_json::Value>,
    },

    /// Execution observed a cancellation request before completing.
    #[error("cancelled")]
    Cancelled,
}

impl ActionError {
    /// Create a failure with no structured details.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            details: None,
        }
    }

    /// Create a failure carrying structured details.
    #[must_use]
    pub fn failed_with_details(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Failed {
            message: message.into(),
            details: Some(details),
        }
    }
}
