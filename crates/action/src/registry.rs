use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::executor::Executor;

/// Node types the runtime expects an executor for at process start.
///
/// Not exhaustive of every type a workflow may reference — custom node types
/// can be registered without appearing here — but every one of these must
/// have a registered [`Executor`] before [`ExecutorRegistry::assert_compatible`]
/// will pass.
const KNOWN_NODE_TYPES: &[&str] = &[
    "Start",
    "End",
    "FileSource",
    "FileSink",
    "DatabaseSource",
    "DatabaseSink",
    "HttpRequest",
    "HttpResponse",
    "Webhook",
    "Filter",
    "Map",
    "FlatMap",
    "Reduce",
    "Aggregate",
    "Join",
    "Fork",
    "Switch",
    "Partition",
    "Repartition",
    "Collect",
    "Distinct",
    "Sort",
    "Limit",
    "Skip",
    "Validate",
    "Schema",
    "Transform",
    "Enrich",
    "Lookup",
    "Cache",
    "CacheInvalidate",
    "Deduplicate",
    "Window",
    "Tumbling",
    "Sliding",
    "Session",
    "Watermark",
    "Checkpoint",
    "Compensation",
    "Wait",
    "Delay",
    "FailJob",
    "Retry",
    "Route",
    "Branch",
    "Merge",
    "Union",
    "Split",
    "Zip",
    "CsvParse",
    "CsvWrite",
    "JsonParse",
    "JsonWrite",
    "XmlParse",
    "XmlWrite",
    "AvroParse",
    "AvroWrite",
    "ParquetRead",
    "ParquetWrite",
    "KafkaSource",
    "KafkaSink",
    "S3Source",
    "S3Sink",
    "EmailSend",
    "SlackNotify",
    "Log",
    "Metric",
    "Assert",
    "NoOp",
];

/// A mapping `nodeType → Executor`, constructed once at startup and shared
/// by reference across concurrent executions.
///
/// Mirrors `flowline_workflow::expander::SubgraphTemplateRegistry`'s
/// construct-once-pass-by-reference shape.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

/// Error returned by [`ExecutorRegistry::assert_compatible`] naming every
/// known node type with no registered executor.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing executors for node types: {}", missing.join(", "))]
pub struct CompatibilityError {
    /// Known node types with no registered executor.
    pub missing: Vec<String>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor. Overwrites any existing executor with the same
    /// key.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let key = executor.key().to_owned();
        self.executors.insert(key, executor);
    }

    /// Look up an executor by its node-type key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(key)
    }

    /// Whether an executor is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.executors.contains_key(key)
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Returns `true` if no executors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Remove an executor by key, returning the removed value.
    pub fn unregister(&mut self, key: &str) -> Option<Arc<dyn Executor>> {
        self.executors.remove(key)
    }

    /// Iterate over all registered `(key, executor)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Executor>)> {
        self.executors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check that every node type in [`KNOWN_NODE_TYPES`] has a registered
    /// executor.
    ///
    /// Run once at process start; a missing entry means the process should
    /// abort startup rather than run with an incomplete node catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CompatibilityError`] naming every missing node type.
    pub fn assert_compatible(&self) -> Result<(), CompatibilityError> {
        let missing: Vec<String> = KNOWN_NODE_TYPES
            .iter()
            .filter(|node_type| !self.contains(node_type))
            .map(|node_type| (*node_type).to_owned())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CompatibilityError { missing })
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("count", &self.executors.len())
            .field("keys", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutorContext;
    use crate::outcome::ExecutorOutcome;
    use async_trait::async_trait;
    use flowline_workflow::StepNode;
    use pretty_assertions::assert_eq;

    struct DummyExecutor(&'static str);

    #[async_trait]
    impl Executor for DummyExecutor {
        fn key(&self) -> &str {
            self.0
        }

        async fn execute(&self, _ctx: &ExecutorContext, _step: &StepNode) -> ExecutorOutcome {
            ExecutorOutcome::success(0, 0)
        }
    }

    fn make_executor(key: &'static str) -> Arc<dyn Executor> {
        Arc::new(DummyExecutor(key))
    }

    #[test]
    fn empty_registry() {
        let reg = ExecutorRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert!(reg.get("anything").is_none());
    }

    #[test]
    fn register_and_get() {
        let mut reg = ExecutorRegistry::new();
        reg.register(make_executor("Filter"));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains("Filter"));
    }

    #[test]
    fn overwrite_existing() {
        let mut reg = ExecutorRegistry::new();
        reg.register(make_executor("Filter"));
        reg.register(make_executor("Filter"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unregister() {
        let mut reg = ExecutorRegistry::new();
        reg.register(make_executor("Filter"));
        assert!(reg.unregister("Filter").is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn assert_compatible_reports_every_missing_type() {
        let reg = ExecutorRegistry::new();
        let err = reg.assert_compatible().unwrap_err();
        assert_eq!(err.missing.len(), KNOWN_NODE_TYPES.len());
    }

    #[test]
    fn assert_compatible_passes_when_all_registered() {
        let mut reg = ExecutorRegistry::new();
        for node_type in KNOWN_NODE_TYPES {
            reg.register(make_executor(node_type));
        }
        assert!(reg.assert_compatible().is_ok());
    }

    #[test]
    fn assert_compatible_names_missing_subset() {
        let mut reg = ExecutorRegistry::new();
        for node_type in KNOWN_NODE_TYPES.iter().filter(|t| **t != "Filter") {
            reg.register(make_executor(node_type));
        }
        let err = reg.assert_compatible().unwrap_err();
        assert_eq!(err.missing, vec!["Filter".to_owned()]);
    }
}
