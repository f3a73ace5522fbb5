//! Resilience and observability primitives for the orchestrator.
//!
//! Provides the ambient production stack shared by the orchestrator crate
//! and the CLI binary: configuration, health checks, graceful shutdown,
//! Prometheus metrics, distributed tracing, and the resilience patterns
//! (circuit breaker, rate limiter, bulkhead) used to isolate failures in
//! sub-agent process management.
//!
//! ## Architecture
//!
//! All patterns here are plain structs and traits, independent of the
//! `Reducer`/`Effect` core abstraction, except [`tracing_support::TracedReducer`]
//! which wraps any reducer to add span instrumentation.

#![allow(
    clippy::uninlined_format_args,
    clippy::format_push_string,
    clippy::unused_self,
    clippy::assigning_clones,
    clippy::no_effect_underscore_binding,
    clippy::missing_const_for_fn,
    clippy::manual_let_else,
    clippy::single_match_else
)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod resilience;
pub mod shutdown;
pub mod tracing_support;

// Re-export commonly used types.
pub use config::{ConcurrencyConfig, Environment, ObservabilityConfig, OrchestratorConfig, ResilienceConfig, SubAgentConfig};
pub use health::{ComponentHealth, HealthCheckable, HealthStatus, K8sHealthEndpoints, SystemHealthCheck};
pub use metrics::{MetricsSnapshot, OrchestratorMetricsRegistry, ORCHESTRATOR_METRICS};
pub use resilience::{Bulkhead, BulkheadConfig, BulkheadRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig};
pub use shutdown::{GenericShutdownHandler, ShutdownCoordinator, ShutdownHandler};
pub use tracing_support::TracedReducer;
