//! Executes a [`CompiledJob`]: worker-pool scheduling, fork/join barrier
//! synchronization, diagnostic context propagation, and persistence hooks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flowline_action::{ActionError, ExecutorContext, ExecutorOutcome, ExecutorRegistry};
use flowline_core::{ExecutionId, NodeId, WorkflowId};
use flowline_workflow::{ExecutionPlan, WorkflowErrorPolicy};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::compiler::{CompiledJob, CompiledStep};
use crate::config::OrchestratorConfig;
use crate::error::RuntimeError;
use crate::failure::{decide, job_disposition, FailureDecision, JobDisposition};
use crate::journal::JournalEntry;
use crate::repository::{ExecutionRepository, LogRecord, RepositoryError};
use crate::state::{JobExecutionState, NodeExecutionState};
use crate::status::{JobStatus, NodeStatus};

/// Per-thread key-value map for log correlation, snapshotted on task
/// submission and installed on the worker that picks the task up.
#[derive(Debug, Clone)]
pub struct DiagnosticContext {
    /// The execution these steps belong to.
    pub execution_id: ExecutionId,
    /// The workflow this execution was compiled from.
    pub workflow_id: WorkflowId,
    /// Correlation ID threaded through every log line for this execution.
    pub correlation_id: String,
}

impl DiagnosticContext {
    /// Build a context whose correlation ID defaults to the execution ID.
    #[must_use]
    pub fn new(execution_id: ExecutionId, workflow_id: WorkflowId) -> Self {
        Self {
            execution_id,
            workflow_id,
            correlation_id: execution_id.to_string(),
        }
    }

    /// A tracing span carrying this context's fields, to be `.instrument()`ed
    /// onto the job's top-level future.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "job_execution",
            execution_id = %self.execution_id,
            workflow_id = %self.workflow_id,
            correlation_id = %self.correlation_id,
        )
    }
}

/// Executes compiled jobs against a shared, bounded worker pool.
///
/// One `ExecutionRuntime` is constructed per process and reused across
/// concurrent executions — the semaphore-backed pool is a process
/// singleton, matching the source's single shared thread pool.
pub struct ExecutionRuntime {
    registry: Arc<ExecutorRegistry>,
    semaphore: Arc<Semaphore>,
}

impl ExecutionRuntime {
    /// Build a runtime sized by `config.max_pool_size`.
    #[must_use]
    pub fn new(registry: Arc<ExecutorRegistry>, config: &OrchestratorConfig) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(config.max_pool_size.max(1))),
        }
    }

    /// Run `job` to completion, persisting node and job progress through
    /// `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the job graph references a node missing
    /// from `plan`, if a job/node status transition is invalid, or if a
    /// persistence write fails.
    pub async fn run<R: ExecutionRepository + 'static>(
        &self,
        job: Arc<CompiledJob>,
        plan: Arc<ExecutionPlan>,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        error_policy: WorkflowErrorPolicy,
        repository: Arc<R>,
        cancellation: CancellationToken,
    ) -> Result<JobStatus, RuntimeError> {
        let diagnostics = DiagnosticContext::new(execution_id, workflow_id);
        let span = diagnostics.span();
        self.run_inner(job, plan, execution_id, workflow_id, error_policy, repository, cancellation)
            .instrument(span)
            .await
    }

    async fn run_inner<R: ExecutionRepository + 'static>(
        &self,
        job: Arc<CompiledJob>,
        plan: Arc<ExecutionPlan>,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        error_policy: WorkflowErrorPolicy,
        repository: Arc<R>,
        cancellation: CancellationToken,
    ) -> Result<JobStatus, RuntimeError> {
        let state = Arc::new(Mutex::new(JobExecutionState::new(execution_id, workflow_id)));

        repository
            .update_execution_status(execution_id, JobStatus::Running, None, None)
            .await
            .map_err(persistence_err)?;
        repository
            .append_execution_log(
                execution_id,
                LogRecord {
                    timestamp: Utc::now(),
                    level: "INFO".to_string(),
                    node_id: None,
                    message: JournalEntry::JobStarted { timestamp: Utc::now() }
                        .to_json()
                        .unwrap_or_default(),
                    stack_trace: None,
                },
            )
            .await
            .map_err(persistence_err)?;

        let ctx = RunContext {
            registry: Arc::clone(&self.registry),
            semaphore: Arc::clone(&self.semaphore),
            repository,
            job,
            plan,
            state,
            execution_id,
            workflow_id,
            cancellation,
        };

        let mut overall = NodeStatus::Success;
        for entry in ctx.job.entry.clone() {
            let status = execute_chain(ctx.clone(), entry, None).await?;
            if matches!(status, NodeStatus::Failed | NodeStatus::Stopped) {
                overall = status;
                break;
            }
        }

        let final_status = self.finalize_job(&ctx, overall, error_policy).await?;
        Ok(final_status)
    }

    async fn finalize_job<R: ExecutionRepository + 'static>(
        &self,
        ctx: &RunContext<R>,
        overall: NodeStatus,
        error_policy: WorkflowErrorPolicy,
    ) -> Result<JobStatus, RuntimeError> {
        let cancel_requested = {
            let state = ctx.state.lock();
            state.status == JobStatus::CancelRequested
        };

        let disposition = if cancel_requested {
            None
        } else if matches!(overall, NodeStatus::Failed | NodeStatus::Stopped) {
            Some(job_disposition(error_policy))
        } else {
            None
        };

        if matches!(
            disposition,
            Some(JobDisposition::CompensateThenFail) | Some(JobDisposition::CompensateThenSucceed)
        ) {
            run_compensation_pass(ctx).await?;
        }

        let final_status = if cancel_requested {
            JobStatus::Cancelled
        } else {
            match disposition {
                None => JobStatus::Success,
                Some(JobDisposition::Fail | JobDisposition::CompensateThenFail) => JobStatus::Failed,
                Some(JobDisposition::Stop) => JobStatus::Cancelled,
                Some(JobDisposition::CompensateThenSucceed) => JobStatus::Success,
            }
        };

        {
            let mut state = ctx.state.lock();
            let from = state.status;
            let to = if matches!(from, JobStatus::CancelRequested) {
                JobStatus::Cancelled
            } else {
                final_status
            };
            state.transition_status(to)?;
        }

        ctx.repository
            .update_execution_status(ctx.execution_id, final_status, Some(Utc::now()), None)
            .await
            .map_err(persistence_err)?;
        ctx.repository
            .rollup_execution_totals(ctx.execution_id)
            .await
            .map_err(persistence_err)?;
        ctx.repository
            .append_execution_log(
                ctx.execution_id,
                LogRecord {
                    timestamp: Utc::now(),
                    level: "INFO".to_string(),
                    node_id: None,
                    message: JournalEntry::JobFinished {
                        timestamp: Utc::now(),
                        status: final_status,
                    }
                    .to_json()
                    .unwrap_or_default(),
                    stack_trace: None,
                },
            )
            .await
            .map_err(persistence_err)?;

        Ok(final_status)
    }

    /// Request cancellation of a running execution: trips the in-process
    /// token immediately and writes `status = cancel_requested` to the
    /// repository so the signal is visible to any process polling
    /// `read_execution_status`, not just this one.
    ///
    /// Observed at the next step or barrier checkpoint; does not interrupt a
    /// running executor call.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the repository write fails.
    pub async fn cancel<R: ExecutionRepository>(
        &self,
        execution_id: ExecutionId,
        token: &CancellationToken,
        repository: &R,
    ) -> Result<(), RuntimeError> {
        token.cancel();
        repository
            .update_execution_status(execution_id, JobStatus::CancelRequested, None, None)
            .await
            .map_err(persistence_err)?;
        repository
            .append_execution_log(
                execution_id,
                LogRecord {
                    timestamp: Utc::now(),
                    level: "WARN".to_string(),
                    node_id: None,
                    message: JournalEntry::CancellationRequested {
                        timestamp: Utc::now(),
                        reason: "external cancellation requested".to_string(),
                    }
                    .to_json()
                    .unwrap_or_default(),
                    stack_trace: None,
                },
            )
            .await
            .map_err(persistence_err)
    }
}

/// Shared handles threaded through every spawned branch of a job run.
/// Cloning is cheap: every field is an `Arc` (or `Copy`) handle.
struct RunContext<R: ExecutionRepository> {
    registry: Arc<ExecutorRegistry>,
    semaphore: Arc<Semaphore>,
    repository: Arc<R>,
    job: Arc<CompiledJob>,
    plan: Arc<ExecutionPlan>,
    state: Arc<Mutex<JobExecutionState>>,
    execution_id: ExecutionId,
    workflow_id: WorkflowId,
    cancellation: CancellationToken,
}

impl<R: ExecutionRepository> Clone for RunContext<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            semaphore: Arc::clone(&self.semaphore),
            repository: Arc::clone(&self.repository),
            job: Arc::clone(&self.job),
            plan: Arc::clone(&self.plan),
            state: Arc::clone(&self.state),
            execution_id: self.execution_id,
            workflow_id: self.workflow_id,
            cancellation: self.cancellation.clone(),
        }
    }
}

fn persistence_err(e: RepositoryError) -> RuntimeError {
    RuntimeError::Persistence(e.to_string())
}

type ChainFuture = Pin<Box<dyn Future<Output = Result<NodeStatus, RuntimeError>> + Send>>;

/// Walk the compiled job graph starting at `node_id`, following sequential
/// transitions and expanding fork branches, until a leaf, an unresolved
/// failure, or `stop_before` is reached.
///
/// `stop_before` bounds a fork branch to the span `trace_branch` computed at
/// compile time: a branch stops the moment it would re-enter the join,
/// leaving the single `run_node(&join)` call in the `ParallelFork` arm below
/// as the only execution of the join and everything downstream.
fn execute_chain<R: ExecutionRepository + 'static>(
    ctx: RunContext<R>,
    mut node_id: NodeId,
    stop_before: Option<NodeId>,
) -> ChainFuture {
    Box::pin(async move {
        loop {
            if stop_before.as_ref() == Some(&node_id) {
                return Ok(NodeStatus::Success);
            }

            if ctx.cancellation.is_cancelled() || persisted_cancellation_requested(&ctx).await {
                ctx.cancellation.cancel();
                request_cancellation(&ctx);
                return Ok(NodeStatus::Stopped);
            }

            let compiled = ctx
                .job
                .steps
                .get(&node_id)
                .cloned()
                .ok_or_else(|| RuntimeError::NodeNotFound(node_id.clone()))?;

            match compiled {
                CompiledStep::Sequential | CompiledStep::Barrier { .. } => {
                    let (status, route_target) = run_node(&ctx, &node_id).await?;
                    match status {
                        NodeStatus::Success | NodeStatus::Skipped => {
                            match next_on_success(&ctx, &node_id) {
                                Some(next) => {
                                    node_id = next;
                                    continue;
                                }
                                None => return Ok(status),
                            }
                        }
                        NodeStatus::Failed => match route_target.or_else(|| next_on_failure(&ctx, &node_id)) {
                            Some(next) => {
                                node_id = next;
                                continue;
                            }
                            None => return Ok(NodeStatus::Failed),
                        },
                        NodeStatus::Stopped => return Ok(NodeStatus::Stopped),
                        NodeStatus::Running => unreachable!("run_node always resolves to a terminal status"),
                    }
                }
                CompiledStep::ParallelFork { branches, join } => {
                    let (fork_status, _) = run_node(&ctx, &node_id).await?;
                    if !matches!(fork_status, NodeStatus::Success | NodeStatus::Skipped) {
                        return Ok(fork_status);
                    }

                    let mut set: JoinSet<Result<NodeStatus, RuntimeError>> = JoinSet::new();
                    let mut spawned = 0usize;
                    for branch in branches {
                        if let Some(root) = branch.into_iter().next() {
                            let branch_ctx = ctx.clone();
                            let branch_stop = join.clone();
                            set.spawn(async move { execute_chain(branch_ctx, root, Some(branch_stop)).await });
                            spawned += 1;
                        }
                    }

                    // Already-spawned branches are awaited to completion even
                    // once one has failed: cancellation here would need a
                    // signal distinct from the job's external cancel token,
                    // and the barrier's own disposition already reflects the
                    // failure once every branch reports in.
                    let mut branch_results = Vec::with_capacity(spawned);
                    while let Some(joined) = set.join_next().await {
                        let status = joined.map_err(|_| RuntimeError::ExecutorShutdown)??;
                        branch_results.push(status);
                    }

                    let _ = ctx
                        .repository
                        .append_execution_log(
                            ctx.execution_id,
                            LogRecord {
                                timestamp: Utc::now(),
                                level: "INFO".to_string(),
                                node_id: Some(join.clone()),
                                message: JournalEntry::JoinReleased {
                                    timestamp: Utc::now(),
                                    node_id: join.clone(),
                                    upstream_count: branch_results.len(),
                                }
                                .to_json()
                                .unwrap_or_default(),
                                stack_trace: None,
                            },
                        )
                        .await;

                    if branch_results
                        .iter()
                        .any(|s| matches!(s, NodeStatus::Failed | NodeStatus::Stopped))
                    {
                        return Ok(NodeStatus::Failed);
                    }

                    let (join_status, _) = run_node(&ctx, &join).await?;
                    match join_status {
                        NodeStatus::Success | NodeStatus::Skipped => match next_on_success(&ctx, &join) {
                            Some(next) => {
                                node_id = next;
                                continue;
                            }
                            None => return Ok(join_status),
                        },
                        other => return Ok(other),
                    }
                }
            }
        }
    })
}

fn next_on_success<R: ExecutionRepository>(ctx: &RunContext<R>, node_id: &NodeId) -> Option<NodeId> {
    ctx.plan.step(node_id).and_then(|s| s.next_steps.first().cloned())
}

fn next_on_failure<R: ExecutionRepository>(ctx: &RunContext<R>, node_id: &NodeId) -> Option<NodeId> {
    ctx.plan.step(node_id).and_then(|s| s.error_steps.first().cloned())
}

fn request_cancellation<R: ExecutionRepository>(ctx: &RunContext<R>) {
    let mut state = ctx.state.lock();
    if state.status == JobStatus::Running {
        let _ = state.transition_status(JobStatus::CancelRequested);
    }
}

/// Whether another process has written `status = cancel_requested` for this
/// execution since the last checkpoint. Best-effort: a read failure is not
/// treated as a cancellation, since the in-process token remains the
/// authoritative signal for this runtime's own `cancel()` calls.
async fn persisted_cancellation_requested<R: ExecutionRepository>(ctx: &RunContext<R>) -> bool {
    ctx.repository
        .read_execution_status(ctx.execution_id)
        .await
        .map(|status| status == JobStatus::CancelRequested.to_string())
        .unwrap_or(false)
}

/// Run one node, applying the [`crate::failure`] engine's decision on
/// failure (retry with delay, skip, route, or stop) until a terminal
/// [`NodeStatus`] is reached.
///
/// Returns the resolved status alongside the [`FailureDecision::Route`]
/// target, if that's how the failure was resolved, so the caller can
/// transition there directly instead of recomputing a target from
/// `error_steps`.
async fn run_node<R: ExecutionRepository + 'static>(
    ctx: &RunContext<R>,
    node_id: &NodeId,
) -> Result<(NodeStatus, Option<NodeId>), RuntimeError> {
    let step = ctx
        .plan
        .step(node_id)
        .cloned()
        .ok_or_else(|| RuntimeError::NodeNotFound(node_id.clone()))?;

    let _permit = match Arc::clone(&ctx.semaphore).try_acquire_owned() {
        Ok(permit) => Some(permit),
        Err(_) => {
            tracing::warn!(node_id = %node_id, "worker pool saturated, running on caller thread");
            None
        }
    };

    if ctx.cancellation.is_cancelled() || persisted_cancellation_requested(ctx).await {
        ctx.cancellation.cancel();
        request_cancellation(ctx);
        return Ok((NodeStatus::Stopped, None));
    }

    let started_at = Utc::now();
    {
        let mut state = ctx.state.lock();
        state.set_node_state(node_id.clone(), NodeExecutionState::new());
    }
    ctx.repository
        .insert_node_execution(ctx.execution_id, node_id, &step.node_type, started_at)
        .await
        .map_err(persistence_err)?;

    let mut attempt: u32 = 0;
    loop {
        let executor = ctx.registry.get(&step.node_type).cloned();
        let exec_ctx = ExecutorContext::new(ctx.execution_id, node_id.clone(), ctx.workflow_id)
            .with_cancellation(ctx.cancellation.child_token());

        let mut timed_out = false;
        let outcome = match &executor {
            Some(executor) => {
                let call = executor.execute(&exec_ctx, &step);
                match step.execution_hints.timeout_ms {
                    Some(timeout_ms) => match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            timed_out = true;
                            ExecutorOutcome::failed(ActionError::Cancelled)
                        }
                    },
                    None => call.await,
                }
            }
            None => ExecutorOutcome::failed(ActionError::failed(format!(
                "no executor registered for node type {}",
                step.node_type
            ))),
        };

        {
            let mut state = ctx.state.lock();
            if let Some(node_state) = state.node_states.get_mut(node_id) {
                if let Some(last) = node_state.attempts.last_mut() {
                    last.complete_with(&outcome);
                }
            }
        }

        if outcome.is_success() {
            let records = outcome.read_count + outcome.write_count + outcome.skip_count;
            finalize_node(ctx, node_id, NodeStatus::Success, started_at, records, None).await?;
            return Ok((NodeStatus::Success, None));
        }

        let failure = if timed_out {
            let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
            RuntimeError::Timeout {
                node: node_id.clone(),
                elapsed_ms,
            }
        } else {
            RuntimeError::ExecutorFailure {
                node: node_id.clone(),
                source: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| ActionError::failed("executor reported failure with no detail")),
            }
        };

        let decision = decide(&step.exception_handling, attempt, &failure);
        match decision {
            FailureDecision::Retry { delay_ms } => {
                attempt += 1;
                {
                    let mut state = ctx.state.lock();
                    if let Some(node_state) = state.node_states.get_mut(node_id) {
                        node_state.begin_retry()?;
                    }
                }
                let _ = ctx
                    .repository
                    .append_execution_log(
                        ctx.execution_id,
                        LogRecord {
                            timestamp: Utc::now(),
                            level: "WARN".to_string(),
                            node_id: Some(node_id.clone()),
                            message: JournalEntry::NodeRetrying {
                                timestamp: Utc::now(),
                                node_id: node_id.clone(),
                                attempt,
                            }
                            .to_json()
                            .unwrap_or_default(),
                            stack_trace: None,
                        },
                    )
                    .await;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                continue;
            }
            FailureDecision::Skip => {
                finalize_node(
                    ctx,
                    node_id,
                    NodeStatus::Skipped,
                    started_at,
                    0,
                    Some(failure.to_string()),
                )
                .await?;
                return Ok((NodeStatus::Skipped, None));
            }
            FailureDecision::Route { target } => {
                finalize_node(
                    ctx,
                    node_id,
                    NodeStatus::Failed,
                    started_at,
                    0,
                    Some(failure.to_string()),
                )
                .await?;
                return Ok((NodeStatus::Failed, Some(target)));
            }
            FailureDecision::Stop => {
                finalize_node(
                    ctx,
                    node_id,
                    NodeStatus::Stopped,
                    started_at,
                    0,
                    Some(failure.to_string()),
                )
                .await?;
                return Ok((NodeStatus::Stopped, None));
            }
        }
    }
}

async fn finalize_node<R: ExecutionRepository + 'static>(
    ctx: &RunContext<R>,
    node_id: &NodeId,
    status: NodeStatus,
    started_at: chrono::DateTime<Utc>,
    records_processed: u64,
    error_message: Option<String>,
) -> Result<(), RuntimeError> {
    let ended_at = Utc::now();
    {
        let mut state = ctx.state.lock();
        if let Some(node_state) = state.node_states.get_mut(node_id) {
            node_state.transition_to(status)?;
            node_state.error_message.clone_from(&error_message);
        }
    }

    let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
    ctx.repository
        .update_node_execution(
            ctx.execution_id,
            node_id,
            status,
            ended_at,
            duration_ms,
            records_processed,
            error_message.as_deref(),
        )
        .await
        .map_err(persistence_err)?;

    let entry = match status {
        NodeStatus::Success => JournalEntry::NodeCompleted {
            timestamp: ended_at,
            node_id: node_id.clone(),
            records_processed,
        },
        NodeStatus::Failed | NodeStatus::Stopped => JournalEntry::NodeFailed {
            timestamp: ended_at,
            node_id: node_id.clone(),
            error: error_message.clone().unwrap_or_else(|| status.to_string()),
        },
        NodeStatus::Skipped => JournalEntry::NodeSkipped {
            timestamp: ended_at,
            node_id: node_id.clone(),
            reason: error_message.clone().unwrap_or_default(),
        },
        NodeStatus::Running => unreachable!(),
    };

    let level = match status {
        NodeStatus::Failed | NodeStatus::Stopped => "ERROR",
        _ => "INFO",
    };

    ctx.repository
        .append_execution_log(
            ctx.execution_id,
            LogRecord {
                timestamp: ended_at,
                level: level.to_string(),
                node_id: Some(node_id.clone()),
                message: entry.to_json().unwrap_or_default(),
                stack_trace: None,
            },
        )
        .await
        .map_err(persistence_err)?;

    Ok(())
}

/// Execute every node marked as a compensator by
/// [`crate::failure::is_compensator`], best-effort, before the job's final
/// status is written.
async fn run_compensation_pass<R: ExecutionRepository + 'static>(ctx: &RunContext<R>) -> Result<(), RuntimeError> {
    let compensators: Vec<NodeId> = ctx
        .plan
        .steps
        .values()
        .filter(|step| crate::failure::is_compensator(step.classification, &step.node_type, &step.config))
        .map(|step| step.node_id.clone())
        .collect();

    for node_id in compensators {
        let _ = run_node(ctx, &node_id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryExecutionRepository;
    use async_trait::async_trait;
    use flowline_action::Executor;
    use flowline_core::WorkflowId;
    use flowline_workflow::{
        ExecutionHints, ExecutionMode, ExecutionPlan as Plan, FailureAction, FailurePolicy,
        StepClassification, StepKind, StepNode,
    };
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl Executor for AlwaysSucceeds {
        fn key(&self) -> &str {
            "NoOp"
        }

        async fn execute(&self, _ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
            ExecutorOutcome::success(1, 1)
        }
    }

    struct FailsNTimesThenSucceeds {
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl Executor for FailsNTimesThenSucceeds {
        fn key(&self) -> &str {
            "Flaky"
        }

        async fn execute(&self, _ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
            if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                ExecutorOutcome::failed(ActionError::failed("transient failure"))
            } else {
                ExecutorOutcome::success(2, 0)
            }
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Executor for AlwaysFails {
        fn key(&self) -> &str {
            "Broken"
        }

        async fn execute(&self, _ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
            ExecutorOutcome::failed(ActionError::failed("permanent failure"))
        }
    }

    struct CountingExecutor {
        key: &'static str,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Executor for CountingExecutor {
        fn key(&self) -> &str {
            self.key
        }

        async fn execute(&self, _ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ExecutorOutcome::success(0, 0)
        }
    }

    struct NeverReturns;

    #[async_trait]
    impl Executor for NeverReturns {
        fn key(&self) -> &str {
            "Stuck"
        }

        async fn execute(&self, _ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
            std::future::pending().await
        }
    }

    fn registry_with(executors: Vec<Arc<dyn Executor>>) -> Arc<ExecutorRegistry> {
        let mut reg = ExecutorRegistry::new();
        for executor in executors {
            reg.register(executor);
        }
        Arc::new(reg)
    }

    fn step(id: &str, node_type: &str, kind: StepKind, next: &[&str]) -> StepNode {
        let mut s = StepNode::new(node(id), node_type);
        s.kind = kind;
        s.next_steps = next.iter().map(|n| node(n)).collect();
        s.classification = StepClassification::Transform;
        s
    }

    fn runtime() -> ExecutionRuntime {
        ExecutionRuntime::new(
            registry_with(vec![
                Arc::new(AlwaysSucceeds),
                Arc::new(AlwaysFails),
                Arc::new(FailsNTimesThenSucceeds {
                    remaining_failures: AtomicU32::new(1),
                }),
            ]),
            &OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn linear_job_succeeds() {
        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["filter"]));
        map.insert(node("filter"), step("filter", "NoOp", StepKind::Normal, &["end"]));
        map.insert(node("end"), step("end", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = runtime()
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Success);
        assert_eq!(repo.node_status(execution_id, &node("end")), Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn fork_join_runs_both_branches_and_completes() {
        let mut fork = step("fork", "NoOp", StepKind::Fork, &["a", "b"]);
        fork.execution_hints = ExecutionHints {
            mode: Some(ExecutionMode::Parallel),
            join_node_id: Some(node("join")),
            ..ExecutionHints::default()
        };
        let mut join = step("join", "CountedJoin", StepKind::Join, &["end"]);
        join.upstream_steps = vec![node("a"), node("b")];

        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["fork"]));
        map.insert(node("fork"), fork);
        map.insert(node("a"), step("a", "NoOp", StepKind::Normal, &["join"]));
        map.insert(node("b"), step("b", "NoOp", StepKind::Normal, &["join"]));
        map.insert(node("join"), join);
        map.insert(node("end"), step("end", "CountedEnd", StepKind::End, &[]));

        let join_calls = Arc::new(AtomicU32::new(0));
        let end_calls = Arc::new(AtomicU32::new(0));
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(AlwaysSucceeds));
        registry.register(Arc::new(CountingExecutor {
            key: "CountedJoin",
            calls: Arc::clone(&join_calls),
        }));
        registry.register(Arc::new(CountingExecutor {
            key: "CountedEnd",
            calls: Arc::clone(&end_calls),
        }));
        let fork_join_registry = Arc::new(registry);

        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());
        let rt = ExecutionRuntime::new(fork_join_registry, &OrchestratorConfig::default());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = rt
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Success);
        assert_eq!(repo.node_status(execution_id, &node("a")), Some(NodeStatus::Success));
        assert_eq!(repo.node_status(execution_id, &node("b")), Some(NodeStatus::Success));
        assert_eq!(repo.node_status(execution_id, &node("join")), Some(NodeStatus::Success));
        assert_eq!(join_calls.load(Ordering::SeqCst), 1, "join must run exactly once");
        assert_eq!(end_calls.load(Ordering::SeqCst), 1, "node past the join must run exactly once");
    }

    #[tokio::test]
    async fn node_timeout_is_enforced_and_routed_through_failure_policy() {
        let mut stuck = step("stuck", "Stuck", StepKind::Normal, &["end"]);
        stuck.execution_hints = ExecutionHints {
            timeout_ms: Some(10),
            ..ExecutionHints::default()
        };
        stuck.exception_handling = FailurePolicy {
            action: FailureAction::Stop,
            max_retries: 0,
            retry_delay_ms: 0,
            route_to_node: None,
            skip_on_error: false,
        };

        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["stuck"]));
        map.insert(node("stuck"), stuck);
        map.insert(node("end"), step("end", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(AlwaysSucceeds));
        registry.register(Arc::new(NeverReturns));
        let rt = ExecutionRuntime::new(Arc::new(registry), &OrchestratorConfig::default());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = rt
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(repo.node_status(execution_id, &node("stuck")), Some(NodeStatus::Stopped));
    }

    #[tokio::test]
    async fn route_transitions_to_policy_target_not_first_error_step() {
        let mut risky = step("risky", "Broken", StepKind::Normal, &["success"]);
        risky.error_steps = vec![node("wrong_handler"), node("right_handler")];
        risky.exception_handling = FailurePolicy {
            action: FailureAction::Route,
            max_retries: 0,
            retry_delay_ms: 0,
            route_to_node: Some(node("right_handler")),
            skip_on_error: false,
        };

        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["risky"]));
        map.insert(node("risky"), risky);
        map.insert(node("wrong_handler"), step("wrong_handler", "Broken", StepKind::Normal, &[]));
        map.insert(node("right_handler"), step("right_handler", "NoOp", StepKind::Normal, &[]));
        map.insert(node("success"), step("success", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = runtime()
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Success);
        assert_eq!(repo.node_status(execution_id, &node("right_handler")), Some(NodeStatus::Success));
        assert_eq!(repo.node_status(execution_id, &node("wrong_handler")), None);
    }

    #[tokio::test]
    async fn external_cancel_writes_persisted_flag_and_is_observed() {
        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["end"]));
        map.insert(node("end"), step("end", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let token = CancellationToken::new();
        let rt = runtime();

        rt.cancel(execution_id, &token, repo.as_ref()).await.unwrap();

        assert_eq!(
            repo.execution_status(execution_id),
            Some(JobStatus::CancelRequested.to_string())
        );
        assert!(token.is_cancelled());

        let status = rt
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                token,
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn retry_then_succeed() {
        let mut risky = step("risky", "Flaky", StepKind::Normal, &["end"]);
        risky.exception_handling = FailurePolicy {
            action: FailureAction::Retry,
            max_retries: 2,
            retry_delay_ms: 1,
            route_to_node: None,
            skip_on_error: false,
        };

        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["risky"]));
        map.insert(node("risky"), risky);
        map.insert(node("end"), step("end", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = runtime()
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Success);
        assert_eq!(repo.node_status(execution_id, &node("risky")), Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn error_route_transitions_to_handler() {
        let mut risky = step("risky", "Broken", StepKind::Normal, &["success"]);
        risky.error_steps = vec![node("handler")];
        risky.exception_handling = FailurePolicy {
            action: FailureAction::Route,
            max_retries: 0,
            retry_delay_ms: 0,
            route_to_node: Some(node("handler")),
            skip_on_error: false,
        };

        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["risky"]));
        map.insert(node("risky"), risky);
        map.insert(node("handler"), step("handler", "NoOp", StepKind::Normal, &[]));
        map.insert(node("success"), step("success", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = runtime()
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Success);
        assert_eq!(repo.node_status(execution_id, &node("risky")), Some(NodeStatus::Failed));
        assert_eq!(repo.node_status(execution_id, &node("handler")), Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn unresolved_stop_fails_the_job() {
        let mut map = IndexMap::new();
        map.insert(node("start"), step("start", "NoOp", StepKind::Start, &["broken"]));
        map.insert(node("broken"), step("broken", "Broken", StepKind::Normal, &["end"]));
        map.insert(node("end"), step("end", "NoOp", StepKind::End, &[]));
        let plan = Arc::new(Plan {
            entry_step_ids: vec![node("start")],
            steps: map,
            workflow_id: Some(WorkflowId::v4()),
        });
        let job = Arc::new(crate::compiler::JobCompiler::compile(&plan).unwrap());

        let repo = Arc::new(InMemoryExecutionRepository::new());
        let execution_id = ExecutionId::v4();
        let status = runtime()
            .run(
                job,
                Arc::clone(&plan),
                execution_id,
                plan.workflow_id.unwrap(),
                WorkflowErrorPolicy::Fail,
                Arc::clone(&repo),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Failed);
    }
}
