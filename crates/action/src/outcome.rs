use crate::error::ActionError;

/// Final disposition of a single [`crate::executor::Executor::execute`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorStatus {
    /// The step completed normally.
    Success,
    /// The step's work failed.
    Failed,
    /// The step was stopped (e.g. by a cooperative cancellation check).
    Stopped,
}

/// Result carried back from an [`crate::executor::Executor`] call: exit
/// status plus read/write/skip counters the runtime rolls up into
/// `node_executions.records_processed`.
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    /// Exit status of the call.
    pub status: ExecutorStatus,
    /// Records read, if applicable to this node type.
    pub read_count: u64,
    /// Records written, if applicable to this node type.
    pub write_count: u64,
    /// Records skipped, if applicable to this node type.
    pub skip_count: u64,
    /// Present when `status != Success`.
    pub error: Option<ActionError>,
}

impl ExecutorOutcome {
    /// A successful outcome with the given counters.
    #[must_use]
    pub fn success(read_count: u64, write_count: u64) -> Self {
        Self {
            status: ExecutorStatus::Success,
            read_count,
            write_count,
            skip_count: 0,
            error: None,
        }
    }

    /// A failed outcome carrying the cause.
    #[must_use]
    pub fn failed(error: ActionError) -> Self {
        Self {
            status: ExecutorStatus::Failed,
            read_count: 0,
            write_count: 0,
            skip_count: 0,
            error: Some(error),
        }
    }

    /// A stopped outcome carrying the cause.
    #[must_use]
    pub fn stopped(error: ActionError) -> Self {
        Self {
            status: ExecutorStatus::Stopped,
            read_count: 0,
            write_count: 0,
            skip_count: 0,
            error: Some(error),
        }
    }

    /// Whether this outcome represents a normal completion.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutorStatus::Success
    }
}
