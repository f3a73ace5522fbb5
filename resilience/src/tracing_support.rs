//! Distributed tracing support for orchestrator reducers.
//!
//! This module provides OpenTelemetry integration using the `tracing` crate
//! with the `tracing-opentelemetry` bridge. This is the idiomatic Rust
//! approach for distributed tracing.
//!
//! ## Architecture
//!
//! - Use `tracing` macros (`#[instrument]`, `info!`, etc.) for all instrumentation
//! - Use `tracing-opentelemetry` subscriber to export spans to Jaeger/OTLP
//! - Span context is automatically propagated via `tracing`'s thread-local storage
//!
//! ## Usage
//!
//! ```ignore
//! tracing_support::init_tracing("orchestrator", "localhost:6831")?;
//!
//! let traced_reducer = TracedReducer::new(my_reducer, "scheduler".to_string());
//! ```

use conductor_core::{effect::Effect, reducer::Reducer};
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{info, span, Level, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Wrapper reducer that adds distributed tracing to any reducer.
///
/// Automatically creates OpenTelemetry spans for all reduce operations,
/// recording execution time and effect counts as span attributes.
pub struct TracedReducer<R> {
    inner: R,
    service_name: String,
}

impl<R> TracedReducer<R> {
    /// Create a new traced reducer wrapper.
    ///
    /// # Arguments
    ///
    /// * `inner` - The reducer to wrap
    /// * `service_name` - Service name for tracing (e.g., "orchestrator")
    pub fn new(inner: R, service_name: String) -> Self {
        Self { inner, service_name }
    }

    /// Get reference to inner reducer.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Get service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl<R> Reducer for TracedReducer<R>
where
    R: Reducer,
    R::Action: std::fmt::Debug,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let span = span!(
            Level::INFO,
            "orchestrator.reduce",
            service.name = %self.service_name,
            otel.kind = "internal",
            reduce.action = ?action,
        );
        let _guard = span.enter();

        let start = Instant::now();
        let effects = self.inner.reduce(state, action, env);

        let duration_ms = start.elapsed().as_millis();
        span.record("reduce.effects.count", effects.len());
        span.record("reduce.duration_ms", duration_ms);

        if effects.is_empty() {
            info!("reducer produced no effects");
        } else {
            info!(
                effects_count = effects.len(),
                duration_ms = duration_ms,
                "reducer execution complete"
            );
        }

        effects
    }
}

/// Initialize tracing with an OpenTelemetry Jaeger exporter.
///
/// Call this at application startup before creating any stores.
///
/// # Errors
///
/// Returns error if Jaeger pipeline initialization fails.
pub fn init_tracing(service_name: &str, jaeger_endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_jaeger::new_agent_pipeline;
    use tracing_subscriber::{layer::SubscriberExt, Registry};

    let tracer = new_agent_pipeline()
        .with_service_name(service_name)
        .with_endpoint(jaeger_endpoint)
        .install_simple()?;

    let opentelemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = Registry::default()
        .with(opentelemetry)
        .with(tracing_subscriber::fmt::layer());

    tracing::subscriber::set_global_default(subscriber)?;

    info!("tracing initialized for service: {}", service_name);

    Ok(())
}

/// Shutdown tracing and flush any pending spans.
///
/// Call this during graceful shutdown to ensure all spans are exported.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Get current span context for manual propagation.
pub fn current_span_context() -> Option<opentelemetry::Context> {
    let span = Span::current();
    if span.is_none() {
        return None;
    }

    Some(span.context())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::environment::Clock;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone)]
    struct TestState {
        counter: u32,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
    }

    struct TestEnvironment;

    impl Clock for TestEnvironment {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Simple test reducer that returns a fixed number of effects.
    struct TestReducer {
        effect_count: usize,
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnvironment;

        fn reduce(
            &self,
            state: &mut Self::State,
            _action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            state.counter += 1;
            let mut effects = SmallVec::new();
            for _ in 0..self.effect_count {
                effects.push(Effect::None);
            }
            effects
        }
    }

    #[test]
    fn traced_reducer_wraps_inner() {
        let inner = TestReducer { effect_count: 2 };
        let traced = TracedReducer::new(inner, "test-service".to_string());

        assert_eq!(traced.service_name(), "test-service");
        assert_eq!(traced.inner().effect_count, 2);
    }

    #[test]
    fn traced_reducer_preserves_effects() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();

        tracing::subscriber::with_default(subscriber, || {
            let inner = TestReducer { effect_count: 3 };
            let traced = TracedReducer::new(inner, "test".to_string());

            let mut state = TestState { counter: 0 };
            let env = TestEnvironment;

            let effects = traced.reduce(&mut state, TestAction::Increment, &env);

            assert_eq!(effects.len(), 3);
            assert_eq!(state.counter, 1);
        });
    }

    #[test]
    fn traced_reducer_with_zero_effects() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();

        tracing::subscriber::with_default(subscriber, || {
            let inner = TestReducer { effect_count: 0 };
            let traced = TracedReducer::new(inner, "test".to_string());

            let mut state = TestState { counter: 0 };
            let env = TestEnvironment;

            let effects = traced.reduce(&mut state, TestAction::Increment, &env);

            assert_eq!(effects.len(), 0);
        });
    }

    #[test]
    fn traced_reducer_multiple_calls() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();

        tracing::subscriber::with_default(subscriber, || {
            let inner = TestReducer { effect_count: 1 };
            let traced = TracedReducer::new(inner, "test".to_string());

            let mut state = TestState { counter: 0 };
            let env = TestEnvironment;

            let effects1 = traced.reduce(&mut state, TestAction::Increment, &env);
            let effects2 = traced.reduce(&mut state, TestAction::Increment, &env);

            assert_eq!(effects1.len(), 1);
            assert_eq!(effects2.len(), 1);
            assert_eq!(state.counter, 2);
        });
    }

    #[test]
    fn current_span_context_without_span_does_not_panic() {
        let context = current_span_context();
        let _ctx = context;
    }
}
