//! Orchestrator-specific configuration layered on top of [`conductor_resilience::config`].

use conductor_resilience::config::{ConfigError, Environment, OrchestratorConfig};
use serde::{Deserialize, Serialize};

/// Orchestrator-specific knobs not covered by the shared resilience config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorRuntimeConfig {
    /// Shared resilience/concurrency/observability configuration.
    pub base: OrchestratorConfig,
    /// Maximum sub-tasks accepted from a single planner response.
    pub max_subtasks: usize,
    /// Maximum idle sub-agents retained across all roles.
    pub max_pool_size: usize,
    /// Interval between monitor snapshot ticks, in seconds.
    pub snapshot_interval_secs: u64,
    /// Capacity of the monitor's bounded snapshot ring.
    pub snapshot_ring_capacity: usize,
    /// Grace delay before phase 1 begins, reserved for UI animation, in milliseconds.
    pub intro_delay_ms: u64,
    /// Hard truncation length for a dependency's result when injected into a downstream prompt.
    pub dependency_context_prefix_len: usize,
    /// Hard truncation length for each sub-task's result/error in the synthesis prompt.
    pub synthesis_result_prefix_len: usize,
    /// Capacity of the lifecycle transition log before batch eviction.
    pub transition_log_capacity: usize,
}

impl OrchestratorRuntimeConfig {
    /// Load configuration for `environment`, applying orchestrator-specific defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the underlying resilience configuration is invalid.
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let base = OrchestratorConfig::load(environment)?;
        Ok(Self {
            base,
            max_subtasks: crate::decompose::MAX_SUBTASKS,
            max_pool_size: crate::pool::DEFAULT_MAX_POOL_SIZE,
            snapshot_interval_secs: crate::monitor::DEFAULT_SNAPSHOT_INTERVAL_SECS,
            snapshot_ring_capacity: crate::monitor::DEFAULT_RING_CAPACITY,
            intro_delay_ms: 1000,
            dependency_context_prefix_len: 500,
            synthesis_result_prefix_len: 800,
            transition_log_capacity: crate::lifecycle::TRANSITION_LOG_CAPACITY,
        })
    }

    /// Load from the `CONFIG_ENV` environment variable, defaulting to development.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the environment variable names an unknown environment
    /// or the underlying resilience configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = OrchestratorConfig::from_env()?;
        Self::load(base.environment)
    }

    /// Validate this configuration and the base resilience configuration it wraps.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid field encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        if self.max_subtasks == 0 {
            return Err(ConfigError::ValidationError("max_subtasks must be > 0".to_string()));
        }
        if self.max_pool_size == 0 {
            return Err(ConfigError::ValidationError("max_pool_size must be > 0".to_string()));
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "snapshot_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for OrchestratorRuntimeConfig {
    #[allow(clippy::expect_used)] // covered by defaults_match_spec_constants below
    fn default() -> Self {
        Self::load(Environment::Development).expect("development defaults are always valid")
    }
}
