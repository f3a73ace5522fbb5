//! Sub-agent pool: role-keyed LIFO idle stacks with hit/miss stats.

use crate::concurrency::ResourcePressure;
use crate::model::{CommanderId, Role, SubAgentId};
use std::collections::HashMap;

/// Default maximum number of idle sub-agents retained across all roles.
pub const DEFAULT_MAX_POOL_SIZE: usize = 8;

/// An idle sub-agent held by the pool, available for re-parenting.
#[derive(Debug, Clone)]
struct PooledAgent {
    id: SubAgentId,
}

/// Outcome of `acquire_or_create`: whether the pool had a matching idle agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Reused an idle agent of the requested role.
    Hit(SubAgentId),
    /// No idle agent of that role was available; caller must create one.
    Miss,
}

/// Role-keyed pool of idle sub-agents, LIFO per role for cache locality.
pub struct SubAgentPool {
    idle: HashMap<Role, Vec<PooledAgent>>,
    max_pool_size: usize,
    hits: u64,
    misses: u64,
    active_non_pooled: usize,
}

impl SubAgentPool {
    /// Create a pool with the default max size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_POOL_SIZE)
    }

    /// Create a pool with an explicit max size.
    #[must_use]
    pub fn with_max_size(max_pool_size: usize) -> Self {
        Self {
            idle: HashMap::new(),
            max_pool_size,
            hits: 0,
            misses: 0,
            active_non_pooled: 0,
        }
    }

    /// Total idle agents currently pooled, across all roles.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.idle.values().map(Vec::len).sum()
    }

    /// Pop the most-recently-released idle agent of `role`, or signal a miss.
    ///
    /// The caller is responsible for actually creating a new agent on `Miss` and
    /// for re-parenting a `Hit` agent to `parent`/`_commander` before use.
    pub fn acquire_or_create(&mut self, role: Role, _commander: CommanderId) -> AcquireOutcome {
        if let Some(stack) = self.idle.get_mut(&role) {
            if let Some(agent) = stack.pop() {
                self.hits += 1;
                self.active_non_pooled += 1;
                return AcquireOutcome::Hit(agent.id);
            }
        }
        self.misses += 1;
        self.active_non_pooled += 1;
        AcquireOutcome::Miss
    }

    /// Release an agent back to the pool if capacity and pressure allow it;
    /// otherwise signal that the caller should destroy it.
    ///
    /// Returns `true` if the agent was retained in the pool, `false` if it must
    /// be destroyed.
    pub fn release(&mut self, role: Role, agent: SubAgentId, pressure: ResourcePressure) -> bool {
        self.active_non_pooled = self.active_non_pooled.saturating_sub(1);

        let under_pressure_ceiling = matches!(pressure, ResourcePressure::Normal | ResourcePressure::Elevated);
        if self.pooled_count() < self.max_pool_size && under_pressure_ceiling {
            self.idle.entry(role).or_default().push(PooledAgent { id: agent });
            true
        } else {
            false
        }
    }

    /// Hit rate = hits / (hits + misses); 0.0 if no acquisitions yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Utilization = active / (active + pooled); 0.0 if the pool is entirely empty.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        let pooled = self.pooled_count();
        let total = self.active_non_pooled + pooled;
        if total == 0 {
            0.0
        } else {
            self.active_non_pooled as f64 / total as f64
        }
    }

    /// Resize the pool's ceiling (e.g. in response to a resource-pressure sample
    /// updating capacity planning before submission).
    pub fn set_max_pool_size(&mut self, max_pool_size: usize) {
        self.max_pool_size = max_pool_size;
    }
}

impl Default for SubAgentPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_on_empty_pool_is_a_miss() {
        let mut pool = SubAgentPool::new();
        let commander = CommanderId::new();
        assert_eq!(
            pool.acquire_or_create(Role::Developer, commander),
            AcquireOutcome::Miss
        );
    }

    #[test]
    fn release_then_acquire_is_a_hit() {
        let mut pool = SubAgentPool::new();
        let commander = CommanderId::new();
        let agent = SubAgentId::new();

        assert!(pool.release(Role::Developer, agent, ResourcePressure::Normal));
        assert_eq!(
            pool.acquire_or_create(Role::Developer, commander),
            AcquireOutcome::Hit(agent)
        );
    }

    #[test]
    fn release_under_high_pressure_destroys_instead_of_pooling() {
        let mut pool = SubAgentPool::new();
        let agent = SubAgentId::new();
        assert!(!pool.release(Role::Developer, agent, ResourcePressure::High));
        assert_eq!(pool.pooled_count(), 0);
    }

    #[test]
    fn release_beyond_max_pool_size_destroys() {
        let mut pool = SubAgentPool::with_max_size(1);
        assert!(pool.release(Role::Developer, SubAgentId::new(), ResourcePressure::Normal));
        assert!(!pool.release(Role::Developer, SubAgentId::new(), ResourcePressure::Normal));
        assert_eq!(pool.pooled_count(), 1);
    }

    #[test]
    fn hit_rate_and_utilization_tracked() {
        let mut pool = SubAgentPool::new();
        let commander = CommanderId::new();
        let agent = SubAgentId::new();

        let _ = pool.acquire_or_create(Role::Developer, commander); // miss
        pool.release(Role::Developer, agent, ResourcePressure::Normal);
        let _ = pool.acquire_or_create(Role::Developer, commander); // hit

        assert!((pool.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
