//! Data model: commanders, sub-agents, orchestrations, sub-tasks, task queue items.
//!
//! See module-level docs in `lib.rs` for how these are owned and mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity for a commander (top-level agent owning one orchestration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommanderId(pub uuid::Uuid);

impl CommanderId {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CommanderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommanderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity for a sub-agent (a pool-managed worker process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubAgentId(pub uuid::Uuid);

impl SubAgentId {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubAgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubAgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The finite set of sub-agent roles used for diversity rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Writes or edits code.
    Developer,
    /// Gathers context, reads code/docs.
    Researcher,
    /// Reviews output for correctness.
    Reviewer,
    /// Writes or runs tests.
    Tester,
    /// Designs interfaces/architecture.
    Designer,
}

/// Fixed rotation order used for role diversity (`roles[index mod 5]`).
pub const ROLE_ROTATION: [Role; 5] = [
    Role::Developer,
    Role::Researcher,
    Role::Reviewer,
    Role::Tester,
    Role::Designer,
];

impl Role {
    /// Role assigned by fixed rotation for a given sub-task index.
    #[must_use]
    pub const fn for_index(index: usize) -> Self {
        ROLE_ROTATION[index % ROLE_ROTATION.len()]
    }

    /// Pick a uniformly random role (used by the decomposition fallback path).
    #[must_use]
    pub fn random() -> Self {
        use rand::seq::SliceRandom;
        *ROLE_ROTATION
            .choose(&mut rand::thread_rng())
            .unwrap_or(&Role::Developer)
    }
}

/// Model identifiers the external CLI may be invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Most capable, most expensive.
    Opus,
    /// Balanced capability/cost.
    Sonnet,
    /// Cheapest, used for planning/synthesis scaffolding.
    Haiku,
}

impl Model {
    /// The cheapest model, used for the decomposition (planning) call.
    #[must_use]
    pub const fn cheapest() -> Self {
        Self::Haiku
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opus => "opus",
            Self::Sonnet => "sonnet",
            Self::Haiku => "haiku",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a sub-agent. See `lifecycle` module for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Spawned but not yet ready to receive work.
    Initializing,
    /// Idle, not pooled, available to be handed a task.
    Idle,
    /// Pooled and idle, owned by the pool.
    Pooled,
    /// Actively executing a tool call or similar.
    Working,
    /// Between turns, reasoning.
    Thinking,
    /// Blocked on a dangerous-command confirmation.
    RequestingPermission,
    /// Blocked on a user-answer question.
    WaitingForAnswer,
    /// Blocked on a plan-review approval.
    ReviewingPlan,
    /// Finished its sub-task successfully or with failure.
    Completed,
    /// Hit an unrecoverable error.
    Error,
    /// Externally paused while working.
    Suspended,
    /// Externally paused while idle.
    SuspendedIdle,
    /// Process is being torn down.
    Destroying,
    /// Process is gone.
    Destroyed,
}

impl LifecycleState {
    /// True for the working/thinking/waiting-for-user states the concurrency
    /// controller's active-count invariant covers: `Working`, `Thinking`,
    /// `RequestingPermission`, `WaitingForAnswer`, `ReviewingPlan`.
    #[must_use]
    pub const fn counts_as_active(self) -> bool {
        matches!(
            self,
            Self::Working | Self::Thinking | Self::RequestingPermission | Self::WaitingForAnswer | Self::ReviewingPlan
        )
    }
}

/// Commander: top-level agent owning one orchestration.
#[derive(Debug, Clone)]
pub struct Commander {
    /// Unique identity.
    pub id: CommanderId,
    /// Model chosen by the user for this submission.
    pub model: Model,
    /// Ordered sub-agent identities created under this commander.
    pub subagents: Vec<SubAgentId>,
    /// Terminal status.
    pub status: CommanderStatus,
}

/// Terminal status of a commander.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommanderStatus {
    /// Still orchestrating.
    Active,
    /// Synthesis succeeded.
    Completed,
    /// Synthesis failed (partial results only).
    Error,
}

/// Phase of one orchestration's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Awaiting/parsing the planner's decomposition.
    Decomposing,
    /// Running sub-tasks in waves.
    Executing,
    /// Merging sub-task outputs into a final answer.
    Synthesizing,
    /// Terminal: synthesis produced a result (possibly partial).
    Completed,
    /// Terminal: cancelled.
    Failed,
}

impl Phase {
    /// Once `Completed` or `Failed`, no further mutation is permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Status of one sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    /// Not yet scheduled.
    Pending,
    /// Scheduled but blocked on a dependency (including a failed one).
    Waiting,
    /// Assigned a sub-agent and running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error, or cancelled.
    Failed,
}

impl SubTaskStatus {
    /// Terminal statuses never transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Scheduling priority. Derived from the planner's `estimated_complexity`,
/// then promoted one level if the sub-task has zero dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest.
    Low,
    /// Default.
    Medium,
    /// Elevated.
    High,
    /// Highest; ceiling for promotion.
    Critical,
}

impl Priority {
    /// Promote one level, saturating at `Critical`.
    #[must_use]
    pub const fn promote(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

/// A single decomposed unit of work.
#[derive(Debug, Clone)]
pub struct SubTask {
    /// Zero-based index into the orchestration's sub-task list.
    pub index: usize,
    /// Short human-readable title.
    pub title: String,
    /// Full instruction prompt for the sub-agent.
    pub prompt: String,
    /// Dependency indices; invariant: all strictly less than `index`.
    pub dependencies: Vec<usize>,
    /// Planner's advisory parallelism hint. Accepted but never consulted by the scheduler.
    pub can_parallel: bool,
    /// Derived scheduling priority.
    pub priority: Priority,
    /// Current status.
    pub status: SubTaskStatus,
    /// Sub-agent currently assigned, if any.
    pub assigned_agent: Option<SubAgentId>,
    /// Opaque external task identity returned by the CLI runtime.
    pub external_task_id: Option<String>,
    /// Result string, set on successful completion.
    pub result: Option<String>,
    /// Error string, set on failure.
    pub error: Option<String>,
    /// When this sub-task entered `InProgress`.
    pub started_at: Option<DateTime<Utc>>,
    /// When this sub-task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubTask {
    /// True if every dependency index is satisfied by a completed sub-task.
    #[must_use]
    pub fn is_ready(&self, all: &[SubTask]) -> bool {
        self.status == SubTaskStatus::Pending
            && self
                .dependencies
                .iter()
                .all(|&d| all.get(d).is_some_and(|t| t.status == SubTaskStatus::Completed))
    }

    /// True if any dependency has failed, making this sub-task permanently un-schedulable.
    #[must_use]
    pub fn has_failed_dependency(&self, all: &[SubTask]) -> bool {
        self.dependencies
            .iter()
            .any(|&d| all.get(d).is_some_and(|t| t.status == SubTaskStatus::Failed))
    }
}

/// One orchestration: the full record for a single user submission.
#[derive(Debug, Clone)]
pub struct Orchestration {
    /// Owning commander.
    pub commander_id: CommanderId,
    /// Original user prompt.
    pub original_prompt: String,
    /// Ordered sub-task list (indices are positions in this vector).
    pub subtasks: Vec<SubTask>,
    /// Current pipeline phase.
    pub phase: Phase,
    /// Current wave number (incremented each time a batch is dispatched).
    pub wave: u32,
    /// Final synthesis result, set once phase reaches a terminal state.
    pub synthesis_result: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp, set once phase is terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Orchestration {
    /// All sub-tasks have reached a terminal status (completed or failed).
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.subtasks.iter().all(|t| t.status.is_terminal())
    }
}

/// A durable mirror of one running sub-task, written for interruption survival.
///
/// The core does not define a serialization format; a host collaborator persists
/// these values and restores them by calling `enqueue`/`mark_completed`/`mark_failed`
/// on a `TaskQueue` (see `queue` module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueItem {
    /// Durable identity of this queue entry.
    pub queue_id: uuid::Uuid,
    /// Owning commander.
    pub commander_id: CommanderId,
    /// Index of the mirrored sub-task.
    pub subtask_index: usize,
    /// Title, duplicated for display without needing the full orchestration.
    pub title: String,
    /// Prompt, duplicated for resumption without needing the full orchestration.
    pub prompt: String,
    /// Assigned sub-agent, if any.
    pub assigned_agent: Option<SubAgentId>,
    /// Dependency indices.
    pub dependencies: Vec<usize>,
    /// Mirrored status.
    pub status: SubTaskStatus,
    /// When this item was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// When this item started running, if it has.
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(index: usize, deps: &[usize], status: SubTaskStatus) -> SubTask {
        SubTask {
            index,
            title: format!("task-{index}"),
            prompt: String::new(),
            dependencies: deps.to_vec(),
            can_parallel: false,
            priority: Priority::Medium,
            status,
            assigned_agent: None,
            external_task_id: None,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn role_rotation_is_deterministic_by_index() {
        assert_eq!(Role::for_index(0), Role::Developer);
        assert_eq!(Role::for_index(4), Role::Designer);
        assert_eq!(Role::for_index(5), Role::Developer);
    }

    #[test]
    fn priority_promotion_saturates_at_critical() {
        assert_eq!(Priority::Low.promote(), Priority::Medium);
        assert_eq!(Priority::Critical.promote(), Priority::Critical);
    }

    #[test]
    fn subtask_ready_requires_all_deps_completed() {
        let all = vec![
            task(0, &[], SubTaskStatus::Completed),
            task(1, &[0], SubTaskStatus::Pending),
        ];
        assert!(all[1].is_ready(&all));

        let all_not_ready = vec![
            task(0, &[], SubTaskStatus::InProgress),
            task(1, &[0], SubTaskStatus::Pending),
        ];
        assert!(!all_not_ready[1].is_ready(&all_not_ready));
    }

    #[test]
    fn subtask_detects_failed_dependency() {
        let all = vec![
            task(0, &[], SubTaskStatus::Failed),
            task(1, &[0], SubTaskStatus::Pending),
        ];
        assert!(all[1].has_failed_dependency(&all));
    }

    #[test]
    fn phase_terminal_states() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Executing.is_terminal());
    }

    #[test]
    fn lifecycle_active_states() {
        assert!(LifecycleState::Working.counts_as_active());
        assert!(LifecycleState::Thinking.counts_as_active());
        assert!(LifecycleState::RequestingPermission.counts_as_active());
        assert!(LifecycleState::WaitingForAnswer.counts_as_active());
        assert!(LifecycleState::ReviewingPlan.counts_as_active());
        assert!(!LifecycleState::Idle.counts_as_active());
        assert!(!LifecycleState::Pooled.counts_as_active());
    }
}
