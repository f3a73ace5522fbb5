//! Passive monitor: periodic snapshots and deduplicated alerts.
//!
//! The monitor never mutates agent state; it only reads from the cleanup manager
//! and pool. Snapshots accumulate on a bounded ring with batch eviction, matching
//! the same amortized-eviction idiom used by [`crate::lifecycle::TransitionLog`].

use crate::cleanup::CleanupManager;
use chrono::{DateTime, Utc};

/// Default snapshot ring capacity (1 hour at the default 10s interval).
pub const DEFAULT_RING_CAPACITY: usize = 360;

/// Default interval between snapshots, in seconds.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 10;

/// Idle duration past which the monitor escalates from warning to critical.
const IDLE_CRITICAL_SECS: i64 = 60;

/// Dedup window for alerts sharing the same message.
const ALERT_DEDUP_WINDOW_SECS: i64 = 30;

/// Severity of a monitor alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Informational; no immediate action required.
    Warning,
    /// Needs attention.
    Critical,
}

/// One alert emitted by a monitor tick.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Severity.
    pub level: AlertLevel,
    /// Human-readable message (also the dedup key).
    pub message: String,
    /// When the alert was raised.
    pub at: DateTime<Utc>,
}

/// One periodic aggregate report.
#[derive(Debug, Clone)]
pub struct Report {
    /// Non-terminal agent count at snapshot time.
    pub non_terminal_count: usize,
    /// Completed-awaiting-cleanup count at snapshot time.
    pub completed_awaiting_cleanup: usize,
    /// Number of currently idle agents.
    pub idle_count: usize,
    /// When the report was produced.
    pub at: DateTime<Utc>,
}

/// Passive observer producing bounded-ring snapshots and deduplicated alerts.
pub struct Monitor {
    ring: Vec<Report>,
    ring_capacity: usize,
    recent_alerts: Vec<Alert>,
}

impl Monitor {
    /// Create a monitor with the default ring capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Create a monitor with an explicit ring capacity (tests use small values).
    #[must_use]
    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            ring: Vec::new(),
            ring_capacity,
            recent_alerts: Vec::new(),
        }
    }

    /// Run one tick: aggregate the cleanup manager's current state into a `Report`,
    /// push it onto the ring (batch-evicting the oldest 20% if full), and return any
    /// newly raised alerts (already deduplicated against the last 30s window).
    pub fn tick(&mut self, cleanup: &CleanupManager, now: DateTime<Utc>) -> (Report, Vec<Alert>) {
        let idle_durations = cleanup.idle_durations(now);
        let report = Report {
            non_terminal_count: cleanup.non_terminal_count(),
            completed_awaiting_cleanup: cleanup.completed_awaiting_cleanup(),
            idle_count: idle_durations.len(),
            at: now,
        };

        self.push_report(report.clone());

        let mut candidates = Vec::new();
        if idle_durations.len() > 3 {
            candidates.push(format!("{} idle agents exceeds warning threshold", idle_durations.len()));
        }
        if idle_durations.iter().any(|(_, d)| d.num_seconds() > IDLE_CRITICAL_SECS) {
            candidates.push("an agent has been idle for more than 60s".to_string());
        }
        if report.completed_awaiting_cleanup > 4 {
            candidates.push(format!(
                "{} agents completed and awaiting cleanup",
                report.completed_awaiting_cleanup
            ));
        }

        let mut raised = Vec::new();
        for message in candidates {
            let level = if message.contains("60s") {
                AlertLevel::Critical
            } else {
                AlertLevel::Warning
            };
            if !self.is_duplicate(&message, now) {
                let alert = Alert { level, message, at: now };
                self.recent_alerts.push(alert.clone());
                raised.push(alert);
            }
        }

        self.recent_alerts
            .retain(|a| (now - a.at).num_seconds() <= ALERT_DEDUP_WINDOW_SECS);

        (report, raised)
    }

    fn is_duplicate(&self, message: &str, now: DateTime<Utc>) -> bool {
        self.recent_alerts
            .iter()
            .any(|a| a.message == message && (now - a.at).num_seconds() <= ALERT_DEDUP_WINDOW_SECS)
    }

    fn push_report(&mut self, report: Report) {
        self.ring.push(report);
        if self.ring.len() > self.ring_capacity {
            let to_remove = ((self.ring_capacity as f64) * 0.2).ceil() as usize;
            let to_remove = to_remove.max(1).min(self.ring.len());
            self.ring.drain(0..to_remove);
        }
    }

    /// All retained reports, oldest first.
    #[must_use]
    pub fn reports(&self) -> &[Report] {
        &self.ring
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubAgentId;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_000_000, 0).expect("valid timestamp")
    }

    #[test]
    fn tick_with_quiet_system_raises_no_alerts() {
        let cleanup = CleanupManager::new();
        let mut monitor = Monitor::new();
        let (_, alerts) = monitor.tick(&cleanup, now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn more_than_three_idle_raises_warning() {
        let mut cleanup = CleanupManager::new();
        for _ in 0..4 {
            cleanup.mark_idle(SubAgentId::new(), now());
        }
        let mut monitor = Monitor::new();
        let (_, alerts) = monitor.tick(&cleanup, now());
        assert!(alerts.iter().any(|a| a.level == AlertLevel::Warning));
    }

    #[test]
    fn idle_over_60s_raises_critical() {
        let mut cleanup = CleanupManager::new();
        cleanup.mark_idle(SubAgentId::new(), now());
        let mut monitor = Monitor::new();
        let later = now() + chrono::Duration::seconds(61);
        let (_, alerts) = monitor.tick(&cleanup, later);
        assert!(alerts.iter().any(|a| a.level == AlertLevel::Critical));
    }

    #[test]
    fn duplicate_alert_within_window_suppressed() {
        let mut cleanup = CleanupManager::new();
        for _ in 0..4 {
            cleanup.mark_idle(SubAgentId::new(), now());
        }
        let mut monitor = Monitor::new();
        let (_, first) = monitor.tick(&cleanup, now());
        assert_eq!(first.len(), 1);

        let (_, second) = monitor.tick(&cleanup, now() + chrono::Duration::seconds(5));
        assert!(second.is_empty());
    }

    #[test]
    fn ring_batch_evicts_when_full() {
        let cleanup = CleanupManager::new();
        let mut monitor = Monitor::with_capacity(10);
        for i in 0..11 {
            let _ = monitor.tick(&cleanup, now() + chrono::Duration::seconds(i));
        }
        assert_eq!(monitor.reports().len(), 9);
    }
}
