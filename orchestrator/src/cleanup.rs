//! Cleanup manager: tracks per-agent idle/terminal timestamps and derives resource
//! pressure for the concurrency controller and pool.

use crate::concurrency::ResourcePressure;
use crate::model::SubAgentId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Soft cap on total non-terminal agents before pressure starts rising.
const SOFT_CAP_NON_TERMINAL: usize = 6;

/// Threshold of completed-awaiting-cleanup agents considered "a lot".
const COMPLETED_AWAITING_CLEANUP_HIGH: usize = 4;

/// Per-agent bookkeeping the cleanup manager needs to compute pressure.
#[derive(Debug, Clone, Copy)]
struct AgentTiming {
    idle_since: Option<DateTime<Utc>>,
    terminal_since: Option<DateTime<Utc>>,
    non_terminal: bool,
}

/// Tracks idle/terminal timestamps per agent and computes resource pressure.
#[derive(Debug, Default)]
pub struct CleanupManager {
    agents: HashMap<SubAgentId, AgentTiming>,
    /// Optional external memory-pressure hint (0.0 = no pressure, 1.0 = severe).
    memory_pressure_hint: Option<f64>,
}

impl CleanupManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `agent` became idle at `now`.
    pub fn mark_idle(&mut self, agent: SubAgentId, now: DateTime<Utc>) {
        let entry = self.agents.entry(agent).or_insert(AgentTiming {
            idle_since: None,
            terminal_since: None,
            non_terminal: true,
        });
        entry.idle_since = Some(now);
        entry.terminal_since = None;
        entry.non_terminal = true;
    }

    /// Record that `agent` is actively working (clears idle tracking).
    pub fn mark_active(&mut self, agent: SubAgentId) {
        let entry = self.agents.entry(agent).or_insert(AgentTiming {
            idle_since: None,
            terminal_since: None,
            non_terminal: true,
        });
        entry.idle_since = None;
        entry.non_terminal = true;
    }

    /// Record that `agent` reached a terminal (completed/error) state awaiting cleanup.
    pub fn mark_terminal(&mut self, agent: SubAgentId, now: DateTime<Utc>) {
        let entry = self.agents.entry(agent).or_insert(AgentTiming {
            idle_since: None,
            terminal_since: None,
            non_terminal: false,
        });
        entry.terminal_since = Some(now);
        entry.non_terminal = false;
    }

    /// Fully remove an agent's bookkeeping (on destruction).
    pub fn remove(&mut self, agent: SubAgentId) {
        self.agents.remove(&agent);
    }

    /// Set (or clear) the external memory-pressure hint, in `[0.0, 1.0]`.
    pub fn set_memory_pressure_hint(&mut self, hint: Option<f64>) {
        self.memory_pressure_hint = hint;
    }

    /// Count of agents currently tracked as non-terminal.
    #[must_use]
    pub fn non_terminal_count(&self) -> usize {
        self.agents.values().filter(|a| a.non_terminal).count()
    }

    /// Count of agents that have reached a terminal state but not yet been destroyed.
    #[must_use]
    pub fn completed_awaiting_cleanup(&self) -> usize {
        self.agents.values().filter(|a| a.terminal_since.is_some()).count()
    }

    /// Idle durations (agent, duration) for all currently-idle agents, as of `now`.
    #[must_use]
    pub fn idle_durations(&self, now: DateTime<Utc>) -> Vec<(SubAgentId, chrono::Duration)> {
        self.agents
            .iter()
            .filter_map(|(id, timing)| timing.idle_since.map(|since| (*id, now - since)))
            .collect()
    }

    /// Derive resource pressure from non-terminal count, cleanup backlog, and the
    /// optional memory hint. The first signal to cross a threshold wins, escalating
    /// toward `Critical`.
    #[must_use]
    pub fn compute_pressure(&self) -> ResourcePressure {
        let non_terminal = self.non_terminal_count();
        let awaiting_cleanup = self.completed_awaiting_cleanup();
        let memory_hint = self.memory_pressure_hint.unwrap_or(0.0);

        if memory_hint >= 0.9 || non_terminal >= SOFT_CAP_NON_TERMINAL * 2 {
            return ResourcePressure::Critical;
        }
        if memory_hint >= 0.7 || non_terminal >= SOFT_CAP_NON_TERMINAL + 2 || awaiting_cleanup >= COMPLETED_AWAITING_CLEANUP_HIGH * 2 {
            return ResourcePressure::High;
        }
        if memory_hint >= 0.4 || non_terminal > SOFT_CAP_NON_TERMINAL || awaiting_cleanup >= COMPLETED_AWAITING_CLEANUP_HIGH {
            return ResourcePressure::Elevated;
        }
        ResourcePressure::Normal
    }
}
