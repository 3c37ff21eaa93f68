//! Orchestrator configuration surface.
//!
//! Mirrors the recognized `workflow.*` options from the persistence and
//! runtime contract: worker pool sizing, validator strictness, subgraph
//! expansion depth, and the default workflow-level error policy.

use std::env;
use std::str::FromStr;

use flowline_workflow::WorkflowErrorPolicy;
use serde::{Deserialize, Serialize};

/// Runtime-wide configuration for the worker pool, validator strictness,
/// and default error policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorConfig {
    /// `workflow.executor.core-pool-size`. Always-warm worker count.
    pub core_pool_size: usize,
    /// `workflow.executor.max-pool-size`. Ceiling the pool grows to under load.
    pub max_pool_size: usize,
    /// `workflow.executor.queue-capacity`. Bounded task queue size before
    /// caller-runs kicks in.
    pub queue_capacity: usize,
    /// `workflow.executor.thread-name-prefix`.
    pub thread_name_prefix: String,
    /// `workflow.executor.await-termination-seconds`. Graceful shutdown
    /// grace period.
    pub await_termination_seconds: u64,
    /// `workflow.executor.allow-core-thread-timeout`.
    pub allow_core_thread_timeout: bool,
    /// `workflow.validation.strict-joins`.
    pub strict_joins: bool,
    /// `workflow.validation.strict-join-upstreams`.
    pub strict_join_upstreams: bool,
    /// `workflow.validation.require-explicit-join`.
    pub require_explicit_join: bool,
    /// `workflow.subgraph.max-expansion-depth`.
    pub max_expansion_depth: u32,
    /// `workflow.error.policy`. Default workflow-level disposition when a
    /// node definition doesn't specify its own.
    pub error_policy: WorkflowErrorPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 4,
            max_pool_size: 16,
            queue_capacity: 100,
            thread_name_prefix: "wf-".to_string(),
            await_termination_seconds: 60,
            allow_core_thread_timeout: true,
            strict_joins: false,
            strict_join_upstreams: false,
            require_explicit_join: false,
            max_expansion_depth: 10,
            error_policy: WorkflowErrorPolicy::Fail,
        }
    }
}

impl OrchestratorConfig {
    /// Build configuration from `WORKFLOW_EXECUTOR_*` / `WORKFLOW_VALIDATION_*`
    /// / `WORKFLOW_SUBGRAPH_*` / `WORKFLOW_ERROR_POLICY` environment
    /// variables, falling back to [`Self::default`] for anything unset.
    ///
    /// Malformed values (non-numeric counts, an unrecognized error policy)
    /// are ignored in favor of the default rather than failing startup.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            core_pool_size: env_parsed("WORKFLOW_EXECUTOR_CORE_POOL_SIZE", defaults.core_pool_size),
            max_pool_size: env_parsed("WORKFLOW_EXECUTOR_MAX_POOL_SIZE", defaults.max_pool_size),
            queue_capacity: env_parsed("WORKFLOW_EXECUTOR_QUEUE_CAPACITY", defaults.queue_capacity),
            thread_name_prefix: env::var("WORKFLOW_EXECUTOR_THREAD_NAME_PREFIX")
                .unwrap_or(defaults.thread_name_prefix),
            await_termination_seconds: env_parsed(
                "WORKFLOW_EXECUTOR_AWAIT_TERMINATION_SECONDS",
                defaults.await_termination_seconds,
            ),
            allow_core_thread_timeout: env_parsed(
                "WORKFLOW_EXECUTOR_ALLOW_CORE_THREAD_TIMEOUT",
                defaults.allow_core_thread_timeout,
            ),
            strict_joins: env_parsed("WORKFLOW_VALIDATION_STRICT_JOINS", defaults.strict_joins),
            strict_join_upstreams: env_parsed(
                "WORKFLOW_VALIDATION_STRICT_JOIN_UPSTREAMS",
                defaults.strict_join_upstreams,
            ),
            require_explicit_join: env_parsed(
                "WORKFLOW_VALIDATION_REQUIRE_EXPLICIT_JOIN",
                defaults.require_explicit_join,
            ),
            max_expansion_depth: env_parsed(
                "WORKFLOW_SUBGRAPH_MAX_EXPANSION_DEPTH",
                defaults.max_expansion_depth,
            ),
            error_policy: env::var("WORKFLOW_ERROR_POLICY")
                .ok()
                .and_then(|raw| parse_error_policy(&raw))
                .unwrap_or(defaults.error_policy),
        }
    }
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn parse_error_policy(raw: &str) -> Option<WorkflowErrorPolicy> {
    match raw.to_ascii_uppercase().as_str() {
        "FAIL" => Some(WorkflowErrorPolicy::Fail),
        "STOP" => Some(WorkflowErrorPolicy::Stop),
        "COMPENSATE_AND_FAIL" => Some(WorkflowErrorPolicy::CompensateAndFail),
        "COMPENSATE_AND_COMPLETE" => Some(WorkflowErrorPolicy::CompensateAndComplete),
        _ => None,
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't interleave with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_matches_documented_values() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.core_pool_size, 4);
        assert_eq!(cfg.max_pool_size, 16);
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.thread_name_prefix, "wf-");
        assert_eq!(cfg.await_termination_seconds, 60);
        assert!(cfg.allow_core_thread_timeout);
        assert!(!cfg.strict_joins);
        assert!(!cfg.strict_join_upstreams);
        assert!(!cfg.require_explicit_join);
        assert_eq!(cfg.max_expansion_depth, 10);
        assert_eq!(cfg.error_policy, WorkflowErrorPolicy::Fail);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::remove_var("WORKFLOW_EXECUTOR_CORE_POOL_SIZE"); }
        unsafe { env::remove_var("WORKFLOW_ERROR_POLICY"); }
        let cfg = OrchestratorConfig::from_env();
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn from_env_reads_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("WORKFLOW_EXECUTOR_CORE_POOL_SIZE", "8"); }
        unsafe { env::set_var("WORKFLOW_ERROR_POLICY", "stop"); }
        let cfg = OrchestratorConfig::from_env();
        assert_eq!(cfg.core_pool_size, 8);
        assert_eq!(cfg.error_policy, WorkflowErrorPolicy::Stop);
        unsafe { env::remove_var("WORKFLOW_EXECUTOR_CORE_POOL_SIZE"); }
        unsafe { env::remove_var("WORKFLOW_ERROR_POLICY"); }
    }

    #[test]
    fn from_env_ignores_malformed_numeric_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("WORKFLOW_EXECUTOR_MAX_POOL_SIZE", "not-a-number"); }
        let cfg = OrchestratorConfig::from_env();
        assert_eq!(cfg.max_pool_size, 16);
        unsafe { env::remove_var("WORKFLOW_EXECUTOR_MAX_POOL_SIZE"); }
    }

    #[test]
    fn parse_error_policy_accepts_known_values() {
        assert_eq!(parse_error_policy("FAIL"), Some(WorkflowErrorPolicy::Fail));
        assert_eq!(
            parse_error_policy("compensate_and_complete"),
            Some(WorkflowErrorPolicy::CompensateAndComplete)
        );
        assert_eq!(parse_error_policy("bogus"), None);
    }
}
