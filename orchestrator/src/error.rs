//! Error taxonomy for the orchestrator crate.

use crate::model::CommanderId;
use thiserror::Error;

/// Library-level errors. Library functions return `Result<T, OrchestratorError>`;
/// the `cli` binary collects these into `anyhow::Result` at its boundary.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The planner's response could not be parsed as the subtasks JSON contract,
    /// or contained fewer than two entries. Recovered locally via fallback.
    #[error("planner response could not be parsed: {0}")]
    PlannerParseFailed(String),

    /// The configured workspace directory does not exist or is not a directory.
    #[error("workspace directory missing: {0}")]
    WorkspaceMissing(String),

    /// Spawning the external CLI binary failed.
    #[error("failed to spawn sub-agent binary {binary}: {source}")]
    SpawnFailed {
        /// Binary name that failed to spawn.
        binary: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Referenced a commander that has no orchestration record.
    #[error("unknown commander: {0}")]
    UnknownCommander(CommanderId),

    /// Referenced a sub-task index outside the orchestration's list.
    #[error("unknown sub-task index: {0}")]
    UnknownSubTask(usize),

    /// A lifecycle transition was attempted that the allow-list rejects.
    #[error("invalid lifecycle transition for event {event}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Event name that triggered the attempted transition.
        event: String,
        /// State transitioned from.
        from: crate::model::LifecycleState,
        /// State attempted to transition to.
        to: crate::model::LifecycleState,
    },

    /// Synthesis (the final merge call) failed. No retry is attempted.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
}
