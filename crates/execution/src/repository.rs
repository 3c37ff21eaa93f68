//! Persistence boundary the runtime writes job and node progress through.
//!
//! `flowline-execution` does not implement a real repository — durable
//! storage is an external collaborator (a database, typically) wired in by
//! the host application. This module only defines the contract and, behind
//! `test-util`, an in-memory double used by this crate's own tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowline_core::{ExecutionId, NodeId};
use thiserror::Error;

/// One entry appended via [`ExecutionRepository::append_execution_log`].
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity, e.g. `"INFO"` or `"ERROR"`.
    pub level: String,
    /// The node this entry concerns, if any.
    pub node_id: Option<NodeId>,
    /// Human-readable message.
    pub message: String,
    /// Captured stack trace, for error-level entries.
    pub stack_trace: Option<String>,
}

/// Errors a repository implementation may report back to the runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepositoryError {
    /// No row exists for the given execution ID.
    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),
    /// The backing store rejected the write or read.
    #[error("repository operation failed: {0}")]
    Backend(String),
}

/// The durable-storage contract the runtime depends on.
///
/// Every step writes through this boundary twice: once before the executor
/// runs (`insert_node_execution`), once after (`update_node_execution`).
/// Implementations must make each status transition a single atomic write;
/// the runtime does not coordinate retries across partial failures.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Record that a node started running.
    async fn insert_node_execution(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        node_type: &str,
        start_time: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Record a node's terminal outcome.
    #[allow(clippy::too_many_arguments)]
    async fn update_node_execution(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        status: crate::status::NodeStatus,
        end_time: DateTime<Utc>,
        duration_ms: u64,
        records_processed: u64,
        error_message: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Read the current persisted status string for an execution.
    async fn read_execution_status(&self, execution_id: ExecutionId) -> Result<String, RepositoryError>;

    /// Update an execution's job-level status.
    async fn update_execution_status(
        &self,
        execution_id: ExecutionId,
        status: crate::status::JobStatus,
        end_time: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Recompute an execution's aggregate totals (node counts, records,
    /// total execution time) from its node rows.
    async fn rollup_execution_totals(&self, execution_id: ExecutionId) -> Result<(), RepositoryError>;

    /// Append one log entry for an execution.
    async fn append_execution_log(
        &self,
        execution_id: ExecutionId,
        record: LogRecord,
    ) -> Result<(), RepositoryError>;

    /// Persist a batch of output records for a node (batch size 500).
    async fn save_node_output_records(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        records: &[serde_json::Value],
    ) -> Result<(), RepositoryError>;
}

/// Maximum number of output records written per
/// [`ExecutionRepository::save_node_output_records`] call.
pub const OUTPUT_RECORD_BATCH_SIZE: usize = 500;

#[cfg(any(test, feature = "test-util"))]
pub use in_memory::InMemoryExecutionRepository;

#[cfg(any(test, feature = "test-util"))]
mod in_memory {
    use super::{ExecutionRepository, LogRecord, RepositoryError, OUTPUT_RECORD_BATCH_SIZE};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use flowline_core::{ExecutionId, NodeId};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    struct NodeRow {
        status: crate::status::NodeStatus,
        records_processed: u64,
        duration_ms: u64,
        error_message: Option<String>,
    }

    #[derive(Debug, Default)]
    struct ExecutionRow {
        status: Option<String>,
        node_rows: HashMap<NodeId, NodeRow>,
        logs: Vec<LogRecord>,
        output_records: HashMap<NodeId, Vec<serde_json::Value>>,
        total_records: u64,
    }

    /// A `parking_lot`-guarded in-memory stand-in for a real database,
    /// scoped to this crate's own tests (and anything enabling
    /// `test-util`).
    #[derive(Debug, Default)]
    pub struct InMemoryExecutionRepository {
        rows: Mutex<HashMap<ExecutionId, ExecutionRow>>,
    }

    impl InMemoryExecutionRepository {
        /// Construct an empty repository.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of a node's current status, for test assertions.
        #[must_use]
        pub fn node_status(&self, execution_id: ExecutionId, node_id: &NodeId) -> Option<crate::status::NodeStatus> {
            self.rows
                .lock()
                .get(&execution_id)?
                .node_rows
                .get(node_id)
                .map(|row| row.status)
        }

        /// Snapshot of an execution's current persisted status string.
        #[must_use]
        pub fn execution_status(&self, execution_id: ExecutionId) -> Option<String> {
            self.rows.lock().get(&execution_id)?.status.clone()
        }

        /// Number of log entries recorded for an execution.
        #[must_use]
        pub fn log_count(&self, execution_id: ExecutionId) -> usize {
            self.rows
                .lock()
                .get(&execution_id)
                .map_or(0, |row| row.logs.len())
        }
    }

    #[async_trait]
    impl ExecutionRepository for InMemoryExecutionRepository {
        async fn insert_node_execution(
            &self,
            execution_id: ExecutionId,
            node_id: &NodeId,
            _node_type: &str,
            _start_time: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            let mut rows = self.rows.lock();
            let row = rows.entry(execution_id).or_default();
            row.node_rows.insert(
                node_id.clone(),
                NodeRow {
                    status: crate::status::NodeStatus::Running,
                    records_processed: 0,
                    duration_ms: 0,
                    error_message: None,
                },
            );
            Ok(())
        }

        async fn update_node_execution(
            &self,
            execution_id: ExecutionId,
            node_id: &NodeId,
            status: crate::status::NodeStatus,
            _end_time: DateTime<Utc>,
            duration_ms: u64,
            records_processed: u64,
            error_message: Option<&str>,
        ) -> Result<(), RepositoryError> {
            let mut rows = self.rows.lock();
            let row = rows
                .get_mut(&execution_id)
                .ok_or(RepositoryError::ExecutionNotFound(execution_id))?;
            let node_row = row
                .node_rows
                .entry(node_id.clone())
                .or_insert_with(|| NodeRow {
                    status,
                    records_processed: 0,
                    duration_ms: 0,
                    error_message: None,
                });
            node_row.status = status;
            node_row.duration_ms = duration_ms;
            node_row.records_processed = records_processed;
            node_row.error_message = error_message.map(str::to_owned);
            row.total_records += records_processed;
            Ok(())
        }

        async fn read_execution_status(&self, execution_id: ExecutionId) -> Result<String, RepositoryError> {
            self.rows
                .lock()
                .get(&execution_id)
                .and_then(|row| row.status.clone())
                .ok_or(RepositoryError::ExecutionNotFound(execution_id))
        }

        async fn update_execution_status(
            &self,
            execution_id: ExecutionId,
            status: crate::status::JobStatus,
            _end_time: Option<DateTime<Utc>>,
            _error_message: Option<&str>,
        ) -> Result<(), RepositoryError> {
            let mut rows = self.rows.lock();
            let row = rows.entry(execution_id).or_default();
            row.status = Some(status.to_string());
            Ok(())
        }

        async fn rollup_execution_totals(&self, execution_id: ExecutionId) -> Result<(), RepositoryError> {
            let rows = self.rows.lock();
            rows.get(&execution_id)
                .ok_or(RepositoryError::ExecutionNotFound(execution_id))?;
            Ok(())
        }

        async fn append_execution_log(
            &self,
            execution_id: ExecutionId,
            record: LogRecord,
        ) -> Result<(), RepositoryError> {
            let mut rows = self.rows.lock();
            rows.entry(execution_id).or_default().logs.push(record);
            Ok(())
        }

        async fn save_node_output_records(
            &self,
            execution_id: ExecutionId,
            node_id: &NodeId,
            records: &[serde_json::Value],
        ) -> Result<(), RepositoryError> {
            if records.len() > OUTPUT_RECORD_BATCH_SIZE {
                return Err(RepositoryError::Backend(format!(
                    "batch of {} exceeds max {}",
                    records.len(),
                    OUTPUT_RECORD_BATCH_SIZE
                )));
            }
            let mut rows = self.rows.lock();
            rows.entry(execution_id)
                .or_default()
                .output_records
                .entry(node_id.clone())
                .or_default()
                .extend_from_slice(records);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::status::{JobStatus, NodeStatus};

        fn node(id: &str) -> NodeId {
            NodeId::new(id).unwrap()
        }

        #[tokio::test]
        async fn insert_then_update_node_execution() {
            let repo = InMemoryExecutionRepository::new();
            let exec_id = ExecutionId::v4();
            let n = node("n1");

            repo.insert_node_execution(exec_id, &n, "filter", Utc::now())
                .await
                .unwrap();
            assert_eq!(repo.node_status(exec_id, &n), Some(NodeStatus::Running));

            repo.update_node_execution(exec_id, &n, NodeStatus::Success, Utc::now(), 12, 100, None)
                .await
                .unwrap();
            assert_eq!(repo.node_status(exec_id, &n), Some(NodeStatus::Success));
        }

        #[tokio::test]
        async fn update_execution_status_then_read_back() {
            let repo = InMemoryExecutionRepository::new();
            let exec_id = ExecutionId::v4();
            repo.update_execution_status(exec_id, JobStatus::Running, None, None)
                .await
                .unwrap();
            assert_eq!(
                repo.read_execution_status(exec_id).await.unwrap(),
                "running"
            );
        }

        #[tokio::test]
        async fn read_execution_status_missing_is_an_error() {
            let repo = InMemoryExecutionRepository::new();
            let err = repo.read_execution_status(ExecutionId::v4()).await.unwrap_err();
            assert!(matches!(err, RepositoryError::ExecutionNotFound(_)));
        }

        #[tokio::test]
        async fn append_and_count_logs() {
            let repo = InMemoryExecutionRepository::new();
            let exec_id = ExecutionId::v4();
            repo.append_execution_log(
                exec_id,
                LogRecord {
                    timestamp: Utc::now(),
                    level: "INFO".into(),
                    node_id: None,
                    message: "job started".into(),
                    stack_trace: None,
                },
            )
            .await
            .unwrap();
            assert_eq!(repo.log_count(exec_id), 1);
        }

        #[tokio::test]
        async fn save_node_output_records_rejects_oversized_batch() {
            let repo = InMemoryExecutionRepository::new();
            let exec_id = ExecutionId::v4();
            let records = vec![serde_json::Value::Null; OUTPUT_RECORD_BATCH_SIZE + 1];
            let err = repo
                .save_node_output_records(exec_id, &node("n1"), &records)
                .await
                .unwrap_err();
            assert!(matches!(err, RepositoryError::Backend(_)));
        }

        #[tokio::test]
        async fn rollup_on_unknown_execution_is_an_error() {
            let repo = InMemoryExecutionRepository::new();
            let err = repo.rollup_execution_totals(ExecutionId::v4()).await.unwrap_err();
            assert!(matches!(err, RepositoryError::ExecutionNotFound(_)));
        }
    }
}
