//! Dependency-aware priority scheduler.
//!
//! One `PriorityScheduler` tracks per-commander scheduling entries and hands out
//! prioritized batches of ready sub-task indices. It holds no sub-task content —
//! only indices, priorities, and statuses mirrored from the orchestration.

use crate::model::{CommanderId, Priority, SubTaskStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One scheduler-owned record for a single sub-task.
#[derive(Debug, Clone)]
struct ScheduleEntry {
    priority: Priority,
    status: SubTaskStatus,
    scheduled_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
}

/// Aggregate scheduling statistics for one orchestration, reporting-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    /// Total sub-tasks that have been scheduled (marked ready and batched at least once).
    pub total_scheduled: u64,
    /// Total sub-tasks that reached `Completed`.
    pub total_completed: u64,
    /// Running sum of wait time between `mark_scheduled` and `mark_started`, in milliseconds.
    wait_time_ms_sum: u64,
    /// Count of samples contributing to `wait_time_ms_sum`.
    wait_time_samples: u64,
}

impl SchedulerStats {
    /// Average wait time between scheduling and start, in milliseconds (0 if no samples).
    #[must_use]
    pub fn average_wait_ms(&self) -> u64 {
        if self.wait_time_samples == 0 {
            0
        } else {
            self.wait_time_ms_sum / self.wait_time_samples
        }
    }
}

/// Per-commander scheduling state and operations.
///
/// A `PriorityScheduler` instance is shared across all commanders in a single
/// execution context, owned by the one serialized facade that drives them.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    orchestrations: HashMap<CommanderId, HashMap<usize, ScheduleEntry>>,
    stats: HashMap<CommanderId, SchedulerStats>,
}

impl PriorityScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh orchestration's sub-tasks with their initial priorities/statuses.
    pub fn register_orchestration(
        &mut self,
        commander: CommanderId,
        entries: impl IntoIterator<Item = (usize, Priority, SubTaskStatus)>,
    ) {
        let map = entries
            .into_iter()
            .map(|(idx, priority, status)| {
                (
                    idx,
                    ScheduleEntry {
                        priority,
                        status,
                        scheduled_at: None,
                        started_at: None,
                    },
                )
            })
            .collect();
        self.orchestrations.insert(commander, map);
        self.stats.insert(commander, SchedulerStats::default());
    }

    /// Update the mirrored status of one sub-task (call on every status transition).
    pub fn set_status(&mut self, commander: CommanderId, index: usize, status: SubTaskStatus, now: DateTime<Utc>) {
        let Some(entries) = self.orchestrations.get_mut(&commander) else {
            return;
        };
        let Some(entry) = entries.get_mut(&index) else {
            return;
        };
        entry.status = status;

        if status == SubTaskStatus::InProgress {
            entry.started_at = Some(now);
            if let (Some(scheduled), Some(stats)) = (entry.scheduled_at, self.stats.get_mut(&commander)) {
                let wait_ms = (now - scheduled).num_milliseconds().max(0) as u64;
                stats.wait_time_ms_sum += wait_ms;
                stats.wait_time_samples += 1;
            }
        }

        if status == SubTaskStatus::Completed {
            if let Some(stats) = self.stats.get_mut(&commander) {
                stats.total_completed += 1;
            }
        }
    }

    /// Number of sub-tasks currently ready (pending with all dependencies satisfied).
    ///
    /// Readiness itself is computed by the caller against the full `SubTask` list
    /// (dependency resolution needs the sub-task contents); this method simply
    /// counts how many of the given ready indices are still `Pending` per the
    /// scheduler's own mirrored status.
    #[must_use]
    pub fn ready_count(&self, commander: CommanderId, ready_indices: &[usize]) -> usize {
        let Some(entries) = self.orchestrations.get(&commander) else {
            return 0;
        };
        ready_indices
            .iter()
            .filter(|idx| entries.get(idx).is_some_and(|e| e.status == SubTaskStatus::Pending))
            .count()
    }

    /// Pop up to `max_size` ready indices in priority order (critical first), ties
    /// broken by lower index first. Marks the returned entries `scheduled_at` = now.
    ///
    /// Idempotent under identical inputs: calling twice without intervening status
    /// changes returns the same batch (entries are not removed, only marked).
    pub fn next_batch(
        &mut self,
        commander: CommanderId,
        ready_indices: &[usize],
        max_size: usize,
        now: DateTime<Utc>,
    ) -> Vec<usize> {
        let Some(entries) = self.orchestrations.get_mut(&commander) else {
            return Vec::new();
        };

        let mut candidates: Vec<(usize, Priority)> = ready_indices
            .iter()
            .filter_map(|&idx| entries.get(&idx).map(|e| (idx, e.priority)))
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.truncate(max_size);

        let batch: Vec<usize> = candidates.into_iter().map(|(idx, _)| idx).collect();

        if let Some(stats) = self.stats.get_mut(&commander) {
            stats.total_scheduled += batch.len() as u64;
        }
        for &idx in &batch {
            if let Some(entry) = entries.get_mut(&idx) {
                entry.scheduled_at.get_or_insert(now);
            }
        }

        batch
    }

    /// Scheduling statistics for a commander (reporting only).
    #[must_use]
    pub fn stats(&self, commander: CommanderId) -> SchedulerStats {
        self.stats.get(&commander).copied().unwrap_or_default()
    }

    /// Drop all scheduling state for a commander. Called on cancel and after synthesis.
    pub fn remove_orchestration(&mut self, commander: CommanderId) {
        self.orchestrations.remove(&commander);
        self.stats.remove(&commander);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).expect("valid timestamp")
    }

    #[test]
    fn next_batch_orders_by_priority_then_index() {
        let mut sched = PriorityScheduler::new();
        let commander = CommanderId::new();
        sched.register_orchestration(
            commander,
            [
                (0, Priority::Low, SubTaskStatus::Pending),
                (1, Priority::Critical, SubTaskStatus::Pending),
                (2, Priority::Critical, SubTaskStatus::Pending),
                (3, Priority::Medium, SubTaskStatus::Pending),
            ],
        );

        let batch = sched.next_batch(commander, &[0, 1, 2, 3], 10, now());
        assert_eq!(batch, vec![1, 2, 3, 0]);
    }

    #[test]
    fn next_batch_respects_max_size() {
        let mut sched = PriorityScheduler::new();
        let commander = CommanderId::new();
        sched.register_orchestration(
            commander,
            [
                (0, Priority::High, SubTaskStatus::Pending),
                (1, Priority::High, SubTaskStatus::Pending),
            ],
        );

        let batch = sched.next_batch(commander, &[0, 1], 1, now());
        assert_eq!(batch, vec![0]);
    }

    #[test]
    fn next_batch_idempotent_without_status_change() {
        let mut sched = PriorityScheduler::new();
        let commander = CommanderId::new();
        sched.register_orchestration(
            commander,
            [(0, Priority::Medium, SubTaskStatus::Pending)],
        );

        let a = sched.next_batch(commander, &[0], 10, now());
        let b = sched.next_batch(commander, &[0], 10, now());
        assert_eq!(a, b);
    }

    #[test]
    fn stats_track_scheduled_and_completed() {
        let mut sched = PriorityScheduler::new();
        let commander = CommanderId::new();
        sched.register_orchestration(
            commander,
            [(0, Priority::Medium, SubTaskStatus::Pending)],
        );

        let _ = sched.next_batch(commander, &[0], 10, now());
        sched.set_status(commander, 0, SubTaskStatus::InProgress, now());
        sched.set_status(commander, 0, SubTaskStatus::Completed, now());

        let stats = sched.stats(commander);
        assert_eq!(stats.total_scheduled, 1);
        assert_eq!(stats.total_completed, 1);
    }

    #[test]
    fn remove_orchestration_clears_state() {
        let mut sched = PriorityScheduler::new();
        let commander = CommanderId::new();
        sched.register_orchestration(commander, [(0, Priority::Low, SubTaskStatus::Pending)]);
        sched.remove_orchestration(commander);
        assert_eq!(sched.ready_count(commander, &[0]), 0);
    }
}
