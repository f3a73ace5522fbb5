//! # Orchestrator
//!
//! Decomposes a natural-language coding task into dependency-linked sub-tasks,
//! runs them as supervised external CLI sub-agent processes against a shared
//! workspace, and synthesizes their outputs into one final answer.
//!
//! ## Pipeline
//!
//! 1. **Decomposition** — a throwaway planner call (cheapest model) proposes a
//!    dependency graph of sub-tasks; malformed or trivial responses fall back
//!    to direct execution (see [`decompose`]).
//! 2. **Execution** — a [`scheduler::PriorityScheduler`] computes the ready set
//!    each time a sub-task finishes; a [`concurrency::ConcurrencyController`]
//!    admits waves under a resource-pressure-adjusted limit; a
//!    [`pool::SubAgentPool`] reuses idle sub-agents by role; each admitted
//!    sub-task runs as a process through [`cli_runtime::CliRuntime`].
//! 3. **Synthesis** — once every sub-task is terminal, a final CLI call merges
//!    completed and failed results into one answer.
//!
//! ## State ownership
//!
//! [`orchestrator::Orchestrator`] is the single owner of all mutable state
//! (spec's "single main actor" execution model). Every external event —
//! process output classified into a [`cli_runtime::RuntimeEvent`], a monitor
//! tick, a new submission — funnels through one of its methods; nothing here
//! takes a lock; callers are expected to run it from one task.

pub mod cleanup;
pub mod cli_runtime;
pub mod concurrency;
pub mod config;
pub mod decompose;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod scheduler;

pub use cli_runtime::{CliRuntime, ProcessHandle, RuntimeEvent};
pub use config::OrchestratorRuntimeConfig;
pub use error::OrchestratorError;
pub use model::{
    Commander, CommanderId, CommanderStatus, LifecycleState, Model, Orchestration, Phase,
    Priority, Role, SubAgentId, SubTask, SubTaskStatus, TaskQueueItem,
};
pub use orchestrator::Orchestrator;
