//! Resource-pressure-sensitive concurrency controller.

use crate::model::{CommanderId, Model, Priority};
use std::collections::VecDeque;

/// System-wide resource pressure level, sampled from the cleanup manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourcePressure {
    /// No pressure; full concurrency allowed.
    #[default]
    Normal,
    /// Mild pressure.
    Elevated,
    /// Significant pressure.
    High,
    /// Severe pressure; admit only one at a time.
    Critical,
}

impl ResourcePressure {
    /// Effective concurrency limit for this pressure level.
    #[must_use]
    pub const fn effective_limit(self) -> usize {
        match self {
            Self::Normal => 4,
            Self::Elevated => 3,
            Self::High => 2,
            Self::Critical => 1,
        }
    }
}

/// One entry waiting in the concurrency controller's pending queue.
#[derive(Debug, Clone)]
pub struct PendingStart {
    /// Owning commander.
    pub commander: CommanderId,
    /// Sub-task index to start.
    pub index: usize,
    /// Model to invoke the sub-agent with.
    pub model: Model,
    /// Scheduling priority, used for queue ordering.
    pub priority: Priority,
}

/// Globally admits sub-agent starts under a resource-pressure-adjusted limit,
/// queueing the rest in priority order (insertion-order tie-break).
pub struct ConcurrencyController {
    pressure: ResourcePressure,
    active_count: usize,
    queue: VecDeque<PendingStart>,
}

impl ConcurrencyController {
    /// Create a controller starting at `Normal` pressure with zero active starts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pressure: ResourcePressure::Normal,
            active_count: 0,
            queue: VecDeque::new(),
        }
    }

    /// Current effective limit given the last sampled pressure.
    #[must_use]
    pub const fn effective_limit(&self) -> usize {
        self.pressure.effective_limit()
    }

    /// Currently active (admitted, not yet completed/cancelled) start count.
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active_count
    }

    /// Number of entries waiting for an admission slot.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Apply a newly sampled pressure level. Applies to future admissions only;
    /// in-flight sub-agents are never preempted.
    pub fn set_pressure(&mut self, pressure: ResourcePressure) {
        self.pressure = pressure;
    }

    /// Request a start slot. If capacity is available, returns `Some` immediately
    /// (the caller should invoke the starter callback synchronously); otherwise the
    /// request is enqueued and `None` is returned.
    #[must_use]
    pub fn request_start(
        &mut self,
        commander: CommanderId,
        index: usize,
        model: Model,
        priority: Priority,
    ) -> Option<(CommanderId, usize, Model)> {
        if self.active_count < self.effective_limit() {
            self.active_count += 1;
            Some((commander, index, model))
        } else {
            self.queue.push_back(PendingStart {
                commander,
                index,
                model,
                priority,
            });
            None
        }
    }

    /// Mark one active start as finished (completed or cancelled) and drain as many
    /// queued entries as the current effective limit allows.
    pub fn task_finished(&mut self) -> Vec<(CommanderId, usize, Model)> {
        self.active_count = self.active_count.saturating_sub(1);
        self.drain_queue()
    }

    fn drain_queue(&mut self) -> Vec<(CommanderId, usize, Model)> {
        let mut started = Vec::new();
        while self.active_count < self.effective_limit() {
            let Some(next) = self.pop_highest_priority() else {
                break;
            };
            self.active_count += 1;
            started.push((next.commander, next.index, next.model));
        }
        started
    }

    fn pop_highest_priority(&mut self) -> Option<PendingStart> {
        if self.queue.is_empty() {
            return None;
        }
        let best_idx = self
            .queue
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.priority.cmp(&b.priority).then(ib.cmp(ia)))
            .map(|(idx, _)| idx)?;
        self.queue.remove(best_idx)
    }

    /// The single place wave width is decided.
    #[must_use]
    pub fn optimal_wave_size(&self, ready_count: usize, total_remaining: usize) -> usize {
        let capacity = self.effective_limit().saturating_sub(self.active_count);
        ready_count.min(capacity).min(total_remaining.max(1))
    }

    /// Rebuild `active_count` directly from an authoritative count (e.g. the lifecycle
    /// manager's live active-agent count) and purge queued entries for one commander.
    /// Called after synthesis completes for that commander.
    pub fn reset_for_commander(&mut self, commander: CommanderId, authoritative_active_count: usize) {
        self.queue.retain(|p| p.commander != commander);
        self.active_count = authoritative_active_count;
    }
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new()
    }
}
