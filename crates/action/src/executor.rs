use async_trait::async_trait;
use flowline_workflow::StepNode;

use crate::context::ExecutorContext;
use crate::outcome::ExecutorOutcome;

/// Polymorphic handle performing the work of a single node type.
///
/// Variants are not a closed sum: new node types register dynamically via
/// [`crate::registry::ExecutorRegistry`], so this is an interface with one
/// operation rather than a fixed enum. Implementations must be stateless and
/// thread-safe — the registry stores them as `Arc<dyn Executor>` shared
/// across concurrent executions.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The node type this executor handles (e.g. `"http.request"`).
    fn key(&self) -> &str;

    /// Perform the work described by `step`, honoring `ctx`'s cancellation
    /// signal.
    async fn execute(&self, ctx: &ExecutorContext, step: &StepNode) -> ExecutorOutcome;
}
