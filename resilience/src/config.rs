//! Configuration management for the orchestrator.
//!
//! # Features
//!
//! - Environment-based configs (dev, staging, production)
//! - Config validation with clear error messages
//! - Sensible defaults for all environments
//! - Type-safe configuration with serde
//!
//! # Example
//!
//! ```no_run
//! use conductor_resilience::config::{OrchestratorConfig, Environment};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::from_env()?;
//! println!("Sub-agent CLI: {}", config.subagent.binary);
//! println!("Max concurrency: {}", config.concurrency.max_concurrent);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// Environment variable not set.
    EnvVarNotSet(String),
    /// Invalid environment value.
    InvalidEnvironment(String),
    /// Configuration validation failed.
    ValidationError(String),
    /// Failed to parse configuration.
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvVarNotSet(var) => write!(f, "Environment variable not set: {var}"),
            Self::InvalidEnvironment(env) => write!(f, "Invalid environment: {env}"),
            Self::ValidationError(msg) => write!(f, "Configuration validation failed: {msg}"),
            Self::ParseError(msg) => write!(f, "Failed to parse configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment (local).
    Development,
    /// Staging environment (pre-production).
    Staging,
    /// Production environment.
    Production,
}

impl Environment {
    /// Get environment from string.
    ///
    /// # Errors
    ///
    /// Returns error if environment string is invalid.
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }

    /// Check if this is production environment.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is development environment.
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Sub-agent CLI invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentConfig {
    /// Name of the CLI binary to spawn for each sub-agent (e.g. "claude").
    pub binary: String,
    /// Model identifier passed via `--model`.
    pub model: String,
    /// Maximum turns a single sub-agent invocation is allowed.
    pub max_turns: u32,
    /// Hard timeout for a single sub-task, in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for a sub-task that fails to spawn or crashes.
    pub max_retries: u32,
}

impl SubAgentConfig {
    /// Validate the sub-agent configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binary.is_empty() {
            return Err(ConfigError::ValidationError("binary cannot be empty".to_string()));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::ValidationError("max_turns must be > 0".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    /// Get timeout as Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_turns: 50,
            timeout_secs: 1800,
            max_retries: 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable tracing.
    pub tracing_enabled: bool,
    /// Jaeger endpoint (e.g., "localhost:6831").
    pub jaeger_endpoint: Option<String>,
    /// Enable metrics.
    pub metrics_enabled: bool,
    /// Metrics port.
    pub metrics_port: u16,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl ObservabilityConfig {
    /// Validate observability configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid log_level: {}. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            tracing_enabled: true,
            jaeger_endpoint: None,
            metrics_enabled: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
        }
    }
}

/// Resilience configuration (circuit breaker / rate limiter / bulkhead defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Circuit breaker failure threshold.
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker timeout in seconds.
    pub circuit_breaker_timeout_secs: u64,
    /// Rate limiter requests per second.
    pub rate_limit_rps: u32,
    /// Bulkhead max concurrent requests.
    pub bulkhead_max_concurrent: usize,
}

impl ResilienceConfig {
    /// Validate resilience configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "circuit_breaker_threshold must be > 0".to_string(),
            ));
        }
        if self.circuit_breaker_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "circuit_breaker_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::ValidationError("rate_limit_rps must be > 0".to_string()));
        }
        if self.bulkhead_max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "bulkhead_max_concurrent must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get circuit breaker timeout as Duration.
    #[must_use]
    pub const fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_secs: 60,
            rate_limit_rps: 10,
            bulkhead_max_concurrent: 100,
        }
    }
}

/// Concurrency controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Floor concurrency limit, used under severe resource pressure.
    pub min_concurrent: usize,
    /// Ceiling concurrency limit, used when resources are idle.
    pub max_concurrent: usize,
    /// Size of the sub-agent pool kept warm for reuse.
    pub pool_size: usize,
    /// Idle duration after which a pooled sub-agent is recycled.
    pub idle_recycle_secs: u64,
}

impl ConcurrencyConfig {
    /// Validate concurrency configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_concurrent == 0 {
            return Err(ConfigError::ValidationError("min_concurrent must be > 0".to_string()));
        }
        if self.max_concurrent < self.min_concurrent {
            return Err(ConfigError::ValidationError(
                "max_concurrent must be >= min_concurrent".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle recycle duration.
    #[must_use]
    pub const fn idle_recycle(&self) -> Duration {
        Duration::from_secs(self.idle_recycle_secs)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            min_concurrent: 1,
            max_concurrent: 8,
            pool_size: 4,
            idle_recycle_secs: 120,
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Sub-agent CLI invocation settings.
    pub subagent: SubAgentConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
    /// Resilience configuration.
    pub resilience: ResilienceConfig,
    /// Concurrency controller configuration.
    pub concurrency: ConcurrencyConfig,
}

impl OrchestratorConfig {
    /// Load configuration from environment.
    ///
    /// Reads `CONFIG_ENV` environment variable (defaults to "development").
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded or is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = std::env::var("CONFIG_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_str)?;
        Self::load(environment)
    }

    /// Load configuration for a specific environment.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let mut config = Self {
            environment,
            subagent: SubAgentConfig::default(),
            observability: ObservabilityConfig::default(),
            resilience: ResilienceConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        };

        match environment {
            Environment::Development => {
                config.observability.log_level = "debug".to_string();
                config.resilience.rate_limit_rps = 100;
            }
            Environment::Staging => {
                config.observability.log_level = "info".to_string();
                config.resilience.rate_limit_rps = 50;
            }
            Environment::Production => {
                config.observability.log_level = "warn".to_string();
                config.resilience.rate_limit_rps = 10;
                config.resilience.circuit_breaker_threshold = 3;
            }
        }

        config.load_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply optional environment-variable overrides (CLI binary, Jaeger endpoint).
    fn load_overrides(&mut self) {
        if let Ok(binary) = std::env::var("ORCHESTRATOR_SUBAGENT_BINARY") {
            self.subagent.binary = binary;
        }
        if let Ok(endpoint) = std::env::var("JAEGER_ENDPOINT") {
            self.observability.jaeger_endpoint = Some(endpoint);
        }
    }

    /// Validate entire configuration.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.subagent.validate()?;
        self.observability.validate()?;
        self.resilience.validate()?;
        self.concurrency.validate()?;
        Ok(())
    }

    /// Check if running in production.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// Check if running in development.
    #[must_use]
    pub const fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            subagent: SubAgentConfig::default(),
            observability: ObservabilityConfig::default(),
            resilience: ResilienceConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_str() {
        assert!(matches!(
            Environment::from_str("dev").unwrap(),
            Environment::Development
        ));
        assert!(matches!(
            Environment::from_str("staging").unwrap(),
            Environment::Staging
        ));
        assert!(matches!(
            Environment::from_str("prod").unwrap(),
            Environment::Production
        ));
        assert!(Environment::from_str("invalid").is_err());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }

    #[test]
    fn test_subagent_config_validation() {
        let mut config = SubAgentConfig::default();
        assert!(config.validate().is_ok());

        config.binary = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_observability_config_validation() {
        let mut config = ObservabilityConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resilience_config_validation() {
        let mut config = ResilienceConfig::default();
        assert!(config.validate().is_ok());

        config.circuit_breaker_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_concurrency_config_validation() {
        let mut config = ConcurrencyConfig::default();
        assert!(config.validate().is_ok());

        config.max_concurrent = 0;
        config.min_concurrent = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_orchestrator_config_defaults() {
        let config = OrchestratorConfig::default();
        assert!(matches!(config.environment, Environment::Development));
        assert_eq!(config.subagent.binary, "claude");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_orchestrator_config_load_development() {
        let config = OrchestratorConfig::load(Environment::Development).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.resilience.rate_limit_rps, 100);
    }

    #[test]
    fn test_orchestrator_config_load_production() {
        let config = OrchestratorConfig::load(Environment::Production).unwrap();
        assert_eq!(config.observability.log_level, "warn");
        assert_eq!(config.resilience.circuit_breaker_threshold, 3);
    }

    #[test]
    fn test_duration_conversions() {
        let subagent_config = SubAgentConfig::default();
        assert_eq!(subagent_config.timeout(), Duration::from_secs(1800));

        let resilience_config = ResilienceConfig::default();
        assert_eq!(
            resilience_config.circuit_breaker_timeout(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::EnvVarNotSet("TEST_VAR".to_string());
        assert_eq!(err.to_string(), "Environment variable not set: TEST_VAR");
    }
}
