//! Prometheus metrics for the orchestrator.
//!
//! ## Metric Types
//!
//! - **Counters**: Monotonically increasing values (subtasks completed, pool evictions).
//! - **Gauges**: Values that go up or down (active sub-agents, queue depth).
//! - **Histograms**: Distribution of values (subtask duration, wave size).
//!
//! ## Usage
//!
//! ```ignore
//! use conductor_resilience::metrics::*;
//!
//! let registry = OrchestratorMetricsRegistry::new()?;
//! registry.record_subtask_execution("code_edit", Duration::from_millis(1500), "success");
//! registry.record_subagent_spawn("success");
//! registry.set_active_subagents(3);
//!
//! let text = registry.export_prometheus()?;
//! ```

use prometheus::{
    core::{AtomicI64, AtomicU64, GenericGauge},
    opts, CounterVec, HistogramOpts, HistogramVec, Registry, TextEncoder,
};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Global metrics registry (singleton).
///
/// Initialized once on first access, uses its own Prometheus registry.
pub static ORCHESTRATOR_METRICS: LazyLock<OrchestratorMetricsRegistry> =
    LazyLock::new(OrchestratorMetricsRegistry::default);

/// Orchestrator metrics registry for Prometheus.
pub struct OrchestratorMetricsRegistry {
    /// Custom registry for metrics (allows multiple registries in tests).
    registry: Arc<Registry>,

    /// Sub-task execution duration (seconds).
    ///
    /// Labels: `worker_type`, `status` (`completed`, `failed`, `cancelled`).
    subtask_duration: HistogramVec,

    /// Sub-agent spawn attempts.
    ///
    /// Labels: `status` (`success`, `error`).
    subagent_spawns: CounterVec,

    /// Scheduler batch (wave) size distribution.
    wave_size: HistogramVec,

    /// Currently active (running) sub-agents.
    active_subagents: GenericGauge<AtomicI64>,

    /// Depth of the pending task queue.
    queue_depth: GenericGauge<AtomicI64>,

    /// Pool lifecycle events.
    ///
    /// Labels: `event` (`recycled`, `evicted`, `created`).
    pool_events: CounterVec,

    /// CLI runtime errors.
    ///
    /// Labels: `kind` (`spawn_failed`, `parse_error`, `timeout`, `nonzero_exit`).
    cli_errors: CounterVec,

    /// Total sub-tasks completed, by outcome.
    subtasks_total: CounterVec,
}

impl OrchestratorMetricsRegistry {
    /// Create a new registry with all metrics registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric fails to register (e.g. duplicate name).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let subtask_duration = HistogramVec::new(
            HistogramOpts::new(
                "orchestrator_subtask_duration_seconds",
                "Sub-task execution duration in seconds",
            )
            .buckets(vec![
                0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ]),
            &["worker_type", "status"],
        )?;

        let subagent_spawns = CounterVec::new(
            opts!(
                "orchestrator_subagent_spawns_total",
                "Sub-agent process spawn attempts"
            ),
            &["status"],
        )?;

        let wave_size = HistogramVec::new(
            HistogramOpts::new(
                "orchestrator_wave_size",
                "Number of sub-tasks dispatched per scheduling wave",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0]),
            &["reason"],
        )?;

        let active_subagents = GenericGauge::new(
            "orchestrator_active_subagents",
            "Number of currently running sub-agent processes",
        )?;

        let queue_depth = GenericGauge::new(
            "orchestrator_queue_depth",
            "Number of sub-tasks waiting for an available slot",
        )?;

        let pool_events = CounterVec::new(
            opts!(
                "orchestrator_pool_events_total",
                "Sub-agent pool lifecycle events"
            ),
            &["event"],
        )?;

        let cli_errors = CounterVec::new(
            opts!(
                "orchestrator_cli_errors_total",
                "CLI runtime errors by kind"
            ),
            &["kind"],
        )?;

        let subtasks_total = CounterVec::new(
            opts!(
                "orchestrator_subtasks_total",
                "Sub-tasks completed by outcome"
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(subtask_duration.clone()))?;
        registry.register(Box::new(subagent_spawns.clone()))?;
        registry.register(Box::new(wave_size.clone()))?;
        registry.register(Box::new(active_subagents.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(pool_events.clone()))?;
        registry.register(Box::new(cli_errors.clone()))?;
        registry.register(Box::new(subtasks_total.clone()))?;

        Ok(Self {
            registry,
            subtask_duration,
            subagent_spawns,
            wave_size,
            active_subagents,
            queue_depth,
            pool_events,
            cli_errors,
            subtasks_total,
        })
    }

    /// Record a sub-task's terminal execution duration.
    pub fn record_subtask_execution(&self, worker_type: &str, duration: Duration, status: &str) {
        self.subtask_duration
            .with_label_values(&[worker_type, status])
            .observe(duration.as_secs_f64());
        self.subtasks_total.with_label_values(&[status]).inc();
    }

    /// Record a sub-agent process spawn attempt.
    pub fn record_subagent_spawn(&self, status: &str) {
        self.subagent_spawns.with_label_values(&[status]).inc();
    }

    /// Record the size of a dispatched scheduling wave.
    pub fn record_wave(&self, size: usize, reason: &str) {
        self.wave_size
            .with_label_values(&[reason])
            .observe(size as f64);
    }

    /// Set the number of currently active sub-agents.
    pub fn set_active_subagents(&self, count: i64) {
        self.active_subagents.set(count);
    }

    /// Get the current active sub-agent count.
    #[must_use]
    pub fn get_active_subagents(&self) -> i64 {
        self.active_subagents.get()
    }

    /// Set the pending queue depth.
    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.set(depth);
    }

    /// Record a pool lifecycle event (`recycled`, `evicted`, `created`).
    pub fn record_pool_event(&self, event: &str) {
        self.pool_events.with_label_values(&[event]).inc();
    }

    /// Record a CLI runtime error by kind.
    pub fn record_cli_error(&self, kind: &str) {
        self.cli_errors.with_label_values(&[kind]).inc();
    }

    /// Export current metrics in Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding the metric families fails.
    pub fn export_prometheus(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = String::new();
        encoder.encode_utf8(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Access the underlying registry (e.g. to merge with a parent registry).
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Take a point-in-time snapshot suitable for a human-readable summary.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_subagents: self.get_active_subagents(),
        }
    }
}

impl Default for OrchestratorMetricsRegistry {
    #[allow(clippy::expect_used)] // registration only fails on duplicate metric names
    fn default() -> Self {
        Self::new().expect("failed to create default orchestrator metrics registry")
    }
}

/// A lightweight summary pulled from the registry for end-of-run logging.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Active sub-agents at the moment of the snapshot.
    pub active_subagents: i64,
}

/// RAII guard tracking an active sub-agent.
///
/// Increments on creation, decrements on drop.
pub struct ActiveSubAgentGuard<'a> {
    registry: &'a OrchestratorMetricsRegistry,
}

impl<'a> ActiveSubAgentGuard<'a> {
    /// Create the guard and increment the active sub-agent gauge.
    #[must_use]
    pub fn new(registry: &'a OrchestratorMetricsRegistry) -> Self {
        registry.set_active_subagents(registry.get_active_subagents() + 1);
        Self { registry }
    }
}

impl Drop for ActiveSubAgentGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .set_active_subagents((self.registry.get_active_subagents() - 1).max(0));
    }
}

/// Scoped timer recording a sub-task's execution duration on completion.
pub struct SubtaskTimer<'a> {
    registry: &'a OrchestratorMetricsRegistry,
    worker_type: String,
    start: std::time::Instant,
}

impl<'a> SubtaskTimer<'a> {
    /// Start timing a sub-task.
    #[must_use]
    pub fn new(registry: &'a OrchestratorMetricsRegistry, worker_type: impl Into<String>) -> Self {
        Self {
            registry,
            worker_type: worker_type.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Stop the timer and record with the given terminal status.
    pub fn finish(self, status: &str) {
        let duration = self.start.elapsed();
        self.registry
            .record_subtask_execution(&self.worker_type, duration, status);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn registry_creation_succeeds() {
        assert!(OrchestratorMetricsRegistry::new().is_ok());
    }

    #[test]
    fn records_subtask_execution() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        registry.record_subtask_execution("code_edit", Duration::from_millis(100), "completed");
        registry.record_subtask_execution("code_edit", Duration::from_secs(1), "failed");

        let text = registry.export_prometheus().unwrap();
        assert!(text.contains("orchestrator_subtask_duration_seconds"));
        assert!(text.contains("code_edit"));
    }

    #[test]
    fn records_subagent_spawn() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        registry.record_subagent_spawn("success");
        registry.record_subagent_spawn("error");

        let text = registry.export_prometheus().unwrap();
        assert!(text.contains("orchestrator_subagent_spawns_total"));
    }

    #[test]
    fn active_subagents_gauge_tracks_count() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        assert_eq!(registry.get_active_subagents(), 0);

        registry.set_active_subagents(1);
        assert_eq!(registry.get_active_subagents(), 1);

        registry.set_active_subagents(2);
        assert_eq!(registry.get_active_subagents(), 2);
    }

    #[test]
    fn active_subagent_guard_decrements_on_drop() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        assert_eq!(registry.get_active_subagents(), 0);

        {
            let _guard1 = ActiveSubAgentGuard::new(&registry);
            {
                let _guard2 = ActiveSubAgentGuard::new(&registry);
                assert_eq!(registry.get_active_subagents(), 2);
            }
            assert_eq!(registry.get_active_subagents(), 1);
        }

        assert_eq!(registry.get_active_subagents(), 0);
    }

    #[test]
    fn records_pool_events_and_cli_errors() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        registry.record_pool_event("recycled");
        registry.record_cli_error("parse_error");

        let text = registry.export_prometheus().unwrap();
        assert!(text.contains("orchestrator_pool_events_total"));
        assert!(text.contains("orchestrator_cli_errors_total"));
    }

    #[test]
    fn subtask_timer_records_on_finish() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        let timer = SubtaskTimer::new(&registry, "timed_worker");
        std::thread::sleep(Duration::from_millis(5));
        timer.finish("completed");

        let text = registry.export_prometheus().unwrap();
        assert!(text.contains("timed_worker"));
    }

    #[test]
    fn export_prometheus_is_well_formed() {
        let registry = OrchestratorMetricsRegistry::new().unwrap();
        registry.record_subtask_execution("agent1", Duration::from_millis(50), "completed");
        registry.set_active_subagents(1);

        let text = registry.export_prometheus().unwrap();
        assert!(text.contains("# HELP"));
        assert!(text.contains("# TYPE"));
        assert!(text.contains("orchestrator_active_subagents"));
    }

    #[test]
    fn global_singleton_is_reachable() {
        ORCHESTRATOR_METRICS.record_subagent_spawn("success");
        let text = ORCHESTRATOR_METRICS.export_prometheus().unwrap();
        assert!(text.contains("orchestrator_subagent_spawns_total"));
    }
}
