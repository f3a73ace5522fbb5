//! Facade: the single owner of all orchestration state
//!
//! Per the "single-writer state" design note, every mutation funnels through this
//! struct's methods. Callers drive it by pumping [`cli_runtime::RuntimeEvent`]s pulled
//! from the channel `CliRuntime::new` returns; nothing here blocks on a lock.

use crate::cleanup::CleanupManager;
use crate::cli_runtime::{CliRuntime, ProcessHandle, RuntimeEvent};
use crate::concurrency::ConcurrencyController;
use crate::decompose::{self, DecompositionOutcome, MAX_SUBTASKS};
use crate::error::OrchestratorError;
use crate::lifecycle::{self, TransitionLog};
use crate::model::{
    Commander, CommanderId, CommanderStatus, LifecycleState, Model, Orchestration, Phase, Priority,
    Role, SubAgentId, SubTask, SubTaskStatus,
};
use crate::monitor::Monitor;
use crate::pool::{AcquireOutcome, SubAgentPool};
use crate::queue::TaskQueue;
use crate::scheduler::PriorityScheduler;
use chrono::{DateTime, Utc};
use conductor_resilience::metrics::ORCHESTRATOR_METRICS;
use std::collections::HashMap;
use std::path::PathBuf;

/// What a sub-agent's running CLI process was spawned for; routes its terminal event.
#[derive(Debug, Clone, Copy)]
enum Purpose {
    /// Phase 1: the planner call, made by a throwaway agent using the cheapest model.
    Planning,
    /// Phase 2: one sub-task, identified by its index.
    SubTask(usize),
    /// Phase 3: the synthesis call, made by the commander's own chosen model.
    Synthesis,
}

struct CommanderContext {
    workspace: PathBuf,
    model: Model,
    agents: HashMap<SubAgentId, Role>,
}

/// Owns every piece of orchestration state: commanders, orchestrations, scheduler,
/// concurrency controller, pool, lifecycle transitions, cleanup/pressure tracking,
/// the monitor, the durable queue mirror, and the CLI process runtime.
pub struct Orchestrator {
    commanders: HashMap<CommanderId, Commander>,
    orchestrations: HashMap<CommanderId, Orchestration>,
    contexts: HashMap<CommanderId, CommanderContext>,
    purposes: HashMap<SubAgentId, (CommanderId, Purpose)>,
    agent_states: HashMap<SubAgentId, LifecycleState>,

    scheduler: PriorityScheduler,
    concurrency: ConcurrencyController,
    pool: SubAgentPool,
    cleanup: CleanupManager,
    monitor: Monitor,
    transition_log: TransitionLog,
    queue: TaskQueue,
    runtime: CliRuntime,

    max_subtasks: usize,
    dependency_context_prefix_len: usize,
    synthesis_result_prefix_len: usize,
    max_turns: u32,
}

impl Orchestrator {
    /// Construct a facade with the given sub-agent binary name (e.g. `"claude"`),
    /// returning the event receiver the host must continuously pump into
    /// [`Orchestrator::handle_event`].
    #[must_use]
    pub fn new(
        subagent_binary: impl Into<String>,
        max_turns: u32,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (runtime, events_rx) = CliRuntime::new(subagent_binary);
        (
            Self {
                commanders: HashMap::new(),
                orchestrations: HashMap::new(),
                contexts: HashMap::new(),
                purposes: HashMap::new(),
                agent_states: HashMap::new(),
                scheduler: PriorityScheduler::new(),
                concurrency: ConcurrencyController::new(),
                pool: SubAgentPool::new(),
                cleanup: CleanupManager::new(),
                monitor: Monitor::new(),
                transition_log: TransitionLog::new(),
                queue: TaskQueue::new(),
                runtime,
                max_subtasks: MAX_SUBTASKS,
                dependency_context_prefix_len: 500,
                synthesis_result_prefix_len: 800,
                max_turns,
            },
            events_rx,
        )
    }

    /// Heuristic gate deciding whether a prompt warrants decomposition
    #[must_use]
    pub fn should_decompose(prompt: &str) -> bool {
        decompose::should_decompose(prompt)
    }

    /// Submit a new prompt. Spawns the planner call immediately; the caller is
    /// expected to have already waited out any `intro_delay` UI grace period.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::WorkspaceMissing` or `SpawnFailed` if the planner
    /// call could not be started.
    pub fn submit(
        &mut self,
        prompt: String,
        model: Model,
        workspace: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<CommanderId, OrchestratorError> {
        let commander_id = CommanderId::new();
        self.commanders.insert(
            commander_id,
            Commander {
                id: commander_id,
                model,
                subagents: Vec::new(),
                status: CommanderStatus::Active,
            },
        );
        self.orchestrations.insert(
            commander_id,
            Orchestration {
                commander_id,
                original_prompt: prompt.clone(),
                subtasks: Vec::new(),
                phase: Phase::Decomposing,
                wave: 0,
                synthesis_result: None,
                created_at: now,
                completed_at: None,
            },
        );
        self.contexts.insert(
            commander_id,
            CommanderContext {
                workspace: workspace.clone(),
                model,
                agents: HashMap::new(),
            },
        );

        if !Self::should_decompose(&prompt) {
            self.fallback_execution(commander_id, prompt, now)?;
            return Ok(commander_id);
        }

        let planner_agent = self.spawn_tracked(
            SubAgentId::new(),
            commander_id,
            Purpose::Planning,
            &workspace,
            &decompose::planner_instruction(&prompt),
            Model::cheapest(),
            now,
        )?;
        tracing::info!(commander = %commander_id, agent = %planner_agent.0, "planner call spawned");
        Ok(commander_id)
    }

    /// Cancel a commander's orchestration: terminate every in-progress process,
    /// return idle sub-agents to the pool, and drop scheduler state.
    pub fn cancel(&mut self, commander_id: CommanderId, now: DateTime<Utc>) {
        let Some(orchestration) = self.orchestrations.get_mut(&commander_id) else {
            return;
        };
        if orchestration.phase.is_terminal() {
            return;
        }
        orchestration.phase = Phase::Failed;
        orchestration.completed_at = Some(now);

        let in_progress_agents: Vec<SubAgentId> = orchestration
            .subtasks
            .iter()
            .filter(|t| t.status == SubTaskStatus::InProgress)
            .filter_map(|t| t.assigned_agent)
            .collect();

        for &agent in &in_progress_agents {
            self.runtime.cancel(ProcessHandle(agent));
            self.agent_states.insert(agent, LifecycleState::Destroyed);
            self.cleanup.remove(agent);
        }

        if let Some(commander) = self.commanders.get_mut(&commander_id) {
            commander.status = CommanderStatus::Error;
        }

        self.disband(commander_id, now);
        tracing::warn!(commander = %commander_id, "orchestration cancelled");
    }

    /// Feed one runtime event into the facade. The host's event loop calls this for
    /// every item pulled from the channel returned by `new`.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::UnknownCommander` if the event's process handle
    /// cannot be traced back to a known commander (should not occur in practice).
    pub fn handle_event(&mut self, event: RuntimeEvent, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let process = match &event {
            RuntimeEvent::StatusChange { process, .. }
            | RuntimeEvent::Progress { process, .. }
            | RuntimeEvent::Completed { process, .. }
            | RuntimeEvent::Failed { process, .. }
            | RuntimeEvent::DangerousCommand { process, .. }
            | RuntimeEvent::AskUserQuestion { process, .. }
            | RuntimeEvent::PlanReview { process, .. }
            | RuntimeEvent::Output { process, .. } => *process,
        };

        let Some(&(commander_id, purpose)) = self.purposes.get(&process.0) else {
            return Ok(());
        };

        if self
            .orchestrations
            .get(&commander_id)
            .is_some_and(|o| o.phase.is_terminal())
        {
            return Ok(());
        }

        match event {
            RuntimeEvent::Completed { result, .. } => self.on_terminal(commander_id, process.0, purpose, Ok(result), now),
            RuntimeEvent::Failed { error, .. } => self.on_terminal(commander_id, process.0, purpose, Err(error), now),
            RuntimeEvent::StatusChange { status, .. } => {
                tracing::debug!(commander = %commander_id, agent = %process.0, %status, "status change");
            }
            RuntimeEvent::DangerousCommand { tool, reason, .. } => {
                tracing::warn!(commander = %commander_id, agent = %process.0, %tool, %reason, "dangerous command surfaced");
            }
            RuntimeEvent::AskUserQuestion { .. } | RuntimeEvent::PlanReview { .. } => {
                tracing::info!(commander = %commander_id, agent = %process.0, "sub-agent blocked awaiting user input");
            }
            RuntimeEvent::Output { entry, .. } => {
                tracing::trace!(commander = %commander_id, agent = %process.0, %entry, "sub-agent output");
            }
            RuntimeEvent::Progress { fraction, .. } => {
                tracing::debug!(commander = %commander_id, agent = %process.0, %fraction, "progress");
            }
        }

        Ok(())
    }

    /// Non-blocking poll to reap exited processes; call periodically alongside
    /// draining the event channel.
    pub async fn poll_exited(&mut self) {
        self.runtime.poll_exited().await;
    }

    /// A passive monitor tick. Call every `snapshot_interval_secs`.
    pub fn monitor_tick(&mut self, now: DateTime<Utc>) -> (crate::monitor::Report, Vec<crate::monitor::Alert>) {
        let report = self.monitor.tick(&self.cleanup, now);
        self.concurrency.set_pressure(self.cleanup.compute_pressure());
        report
    }

    fn on_terminal(
        &mut self,
        commander_id: CommanderId,
        agent: SubAgentId,
        purpose: Purpose,
        outcome: Result<String, String>,
        now: DateTime<Utc>,
    ) {
        self.purposes.remove(&agent);

        match purpose {
            Purpose::Planning => self.on_planning_terminal(commander_id, outcome, now),
            Purpose::SubTask(index) => self.on_subtask_terminal(commander_id, agent, index, outcome, now),
            Purpose::Synthesis => self.on_synthesis_terminal(commander_id, outcome, now),
        }
    }

    fn on_planning_terminal(&mut self, commander_id: CommanderId, outcome: Result<String, String>, now: DateTime<Utc>) {
        let raw = match outcome {
            Ok(text) => text,
            Err(_) => {
                let prompt = self
                    .orchestrations
                    .get(&commander_id)
                    .map(|o| o.original_prompt.clone())
                    .unwrap_or_default();
                let _ = self.fallback_execution(commander_id, prompt, now);
                return;
            }
        };

        match decompose::decompose(&raw) {
            DecompositionOutcome::Fallback => {
                let prompt = self
                    .orchestrations
                    .get(&commander_id)
                    .map(|o| o.original_prompt.clone())
                    .unwrap_or_default();
                let _ = self.fallback_execution(commander_id, prompt, now);
            }
            DecompositionOutcome::Plan(plan) => {
                let subtasks: Vec<SubTask> = plan
                    .into_iter()
                    .take(self.max_subtasks)
                    .enumerate()
                    .map(|(index, entry)| {
                        let mut priority = entry.estimated_complexity.to_priority();
                        if entry.dependencies.is_empty() {
                            priority = priority.promote();
                        }
                        SubTask {
                            index,
                            title: entry.title,
                            prompt: entry.prompt,
                            dependencies: entry.dependencies,
                            can_parallel: entry.can_parallel,
                            priority,
                            status: SubTaskStatus::Pending,
                            assigned_agent: None,
                            external_task_id: None,
                            result: None,
                            error: None,
                            started_at: None,
                            finished_at: None,
                        }
                    })
                    .collect();

                let entries = subtasks.iter().map(|t| (t.index, t.priority, t.status));
                self.scheduler.register_orchestration(commander_id, entries);

                if let Some(orchestration) = self.orchestrations.get_mut(&commander_id) {
                    orchestration.subtasks = subtasks;
                    orchestration.phase = Phase::Executing;
                }

                self.tick(commander_id, now);
            }
        }
    }

    /// The fallback path: abandon decomposition, spawn two random-role sub-agents,
    /// forward the original prompt as a single task each.
    fn fallback_execution(&mut self, commander_id: CommanderId, prompt: String, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let subtasks: Vec<SubTask> = (0..2)
            .map(|index| SubTask {
                index,
                title: format!("direct-execution-{index}"),
                prompt: prompt.clone(),
                dependencies: Vec::new(),
                can_parallel: true,
                priority: Priority::Medium,
                status: SubTaskStatus::Pending,
                assigned_agent: None,
                external_task_id: None,
                result: None,
                error: None,
                started_at: None,
                finished_at: None,
            })
            .collect();

        let entries = subtasks.iter().map(|t| (t.index, t.priority, t.status));
        self.scheduler.register_orchestration(commander_id, entries);

        if let Some(orchestration) = self.orchestrations.get_mut(&commander_id) {
            orchestration.subtasks = subtasks;
            orchestration.phase = Phase::Executing;
        }

        self.tick(commander_id, now);
        Ok(())
    }

    /// Phase 2 tick: apply the mark-as-failed decision, compute readiness, and
    /// dispatch a new wave if capacity allows.
    fn tick(&mut self, commander_id: CommanderId, now: DateTime<Utc>) {
        self.propagate_dependency_failures(commander_id, now);

        let Some(orchestration) = self.orchestrations.get(&commander_id) else {
            return;
        };

        if orchestration.all_terminal() {
            self.start_synthesis(commander_id, now);
            return;
        }

        let ready: Vec<usize> = orchestration
            .subtasks
            .iter()
            .filter(|t| t.is_ready(&orchestration.subtasks))
            .map(|t| t.index)
            .collect();

        let in_progress = orchestration
            .subtasks
            .iter()
            .filter(|t| t.status == SubTaskStatus::InProgress)
            .count();
        let remaining = orchestration
            .subtasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .count();

        if ready.is_empty() {
            if in_progress == 0 && remaining == 0 {
                self.start_synthesis(commander_id, now);
            }
            return;
        }

        let wave_size = self.concurrency.optimal_wave_size(ready.len(), remaining);
        if wave_size == 0 {
            return;
        }

        let batch = self.scheduler.next_batch(commander_id, &ready, wave_size, now);
        ORCHESTRATOR_METRICS.record_wave(batch.len(), "phase2");

        for index in batch {
            self.dispatch_subtask(commander_id, index, now);
        }
    }

    /// Marks every sub-task transitively downstream of a failed dependency as
    /// `Failed`. Runs to a fixpoint: a chain `0 -> 1 -> 2` with index 0 failed
    /// needs two passes before index 2 sees its (by-then-failed) dependency 1.
    fn propagate_dependency_failures(&mut self, commander_id: CommanderId, now: DateTime<Utc>) {
        loop {
            let Some(orchestration) = self.orchestrations.get_mut(&commander_id) else {
                return;
            };

            let failed_indices: Vec<usize> = (0..orchestration.subtasks.len())
                .filter(|&i| {
                    let task = &orchestration.subtasks[i];
                    !task.status.is_terminal() && task.has_failed_dependency(&orchestration.subtasks)
                })
                .collect();

            if failed_indices.is_empty() {
                return;
            }

            for &index in &failed_indices {
                let task = &mut orchestration.subtasks[index];
                task.status = SubTaskStatus::Failed;
                task.error = Some("Dependency failed".to_string());
                task.finished_at = Some(now);
                self.scheduler.set_status(commander_id, index, SubTaskStatus::Failed, now);
            }
        }
    }

    /// Request a concurrency slot for `index`; if granted immediately, start its
    /// process. If not, the concurrency controller has queued it internally and will
    /// hand it back through `requeue_started` once a slot frees up.
    fn dispatch_subtask(&mut self, commander_id: CommanderId, index: usize, now: DateTime<Utc>) {
        let Some(context) = self.contexts.get(&commander_id) else {
            return;
        };
        let commander_model = context.model;

        let Some(priority) = self
            .orchestrations
            .get(&commander_id)
            .and_then(|o| o.subtasks.get(index))
            .map(|t| t.priority)
        else {
            return;
        };

        if self
            .concurrency
            .request_start(commander_id, index, commander_model, priority)
            .is_some()
        {
            self.start_subtask_process(commander_id, index, now);
        }
    }

    /// Actually acquire a pool agent and spawn its CLI process. Caller must already
    /// hold a concurrency slot for `index` (via `request_start` or a queue drain).
    fn start_subtask_process(&mut self, commander_id: CommanderId, index: usize, now: DateTime<Utc>) {
        let Some(context) = self.contexts.get(&commander_id) else {
            return;
        };
        let workspace = context.workspace.clone();
        let commander_model = context.model;

        let Some(orchestration) = self.orchestrations.get(&commander_id) else {
            return;
        };
        let Some(task) = orchestration.subtasks.get(index) else {
            return;
        };
        let prompt = self.compose_subtask_prompt(orchestration, task);
        let role = Role::for_index(index);

        let agent = match self.pool.acquire_or_create(role, commander_id) {
            AcquireOutcome::Hit(agent) => agent,
            AcquireOutcome::Miss => SubAgentId::new(),
        };

        match self.spawn_tracked(agent, commander_id, Purpose::SubTask(index), &workspace, &prompt, commander_model, now) {
            Ok(handle) => {
                debug_assert_eq!(handle.0, agent, "spawn_tracked is given the pool-acquired agent id");
                self.agent_states.insert(agent, LifecycleState::Working);
                self.cleanup.mark_active(agent);

                if let Some(context) = self.contexts.get_mut(&commander_id) {
                    context.agents.insert(agent, role);
                }
                if let Some(commander) = self.commanders.get_mut(&commander_id) {
                    if !commander.subagents.contains(&agent) {
                        commander.subagents.push(agent);
                    }
                }

                let queue_id = self.queue.enqueue(
                    commander_id,
                    index,
                    task.title.clone(),
                    task.prompt.clone(),
                    task.dependencies.clone(),
                    now,
                );
                self.queue.mark_started(queue_id, agent, now);

                if let Some(orchestration) = self.orchestrations.get_mut(&commander_id) {
                    if let Some(task) = orchestration.subtasks.get_mut(index) {
                        task.status = SubTaskStatus::InProgress;
                        task.assigned_agent = Some(agent);
                        task.started_at = Some(now);
                        task.external_task_id = Some(queue_id.to_string());
                    }
                }
                self.scheduler.set_status(commander_id, index, SubTaskStatus::InProgress, now);
                ORCHESTRATOR_METRICS.record_subagent_spawn("success");
            }
            Err(err) => {
                tracing::error!(commander = %commander_id, %index, error = %err, "sub-task spawn failed");
                ORCHESTRATOR_METRICS.record_subagent_spawn("error");
                // The pool agent was never actually handed a process; destroy it
                // rather than returning it to the pool in an unknown state.
                self.pool.release(role, agent, crate::concurrency::ResourcePressure::Critical);
                self.agent_states.insert(agent, LifecycleState::Destroyed);

                if let Some(orchestration) = self.orchestrations.get_mut(&commander_id) {
                    if let Some(task) = orchestration.subtasks.get_mut(index) {
                        task.status = SubTaskStatus::Failed;
                        task.error = Some(err.to_string());
                        task.finished_at = Some(now);
                    }
                }
                self.scheduler.set_status(commander_id, index, SubTaskStatus::Failed, now);
                let started = self.concurrency.task_finished();
                self.requeue_started(started, now);
                self.tick(commander_id, now);
            }
        }
    }

    fn compose_subtask_prompt(&self, orchestration: &Orchestration, task: &SubTask) -> String {
        if task.dependencies.is_empty() {
            return task.prompt.clone();
        }

        let mut context_lines = String::from("Context from previous steps:\n");
        for &dep_index in &task.dependencies {
            if let Some(dep) = orchestration.subtasks.get(dep_index) {
                let result = dep.result.as_deref().unwrap_or("");
                let prefix: String = result.chars().take(self.dependency_context_prefix_len).collect();
                context_lines.push_str(&format!("- {}: {}\n", dep.title, prefix));
            }
        }
        format!("{context_lines}\n{}", task.prompt)
    }

    fn on_subtask_terminal(
        &mut self,
        commander_id: CommanderId,
        agent: SubAgentId,
        index: usize,
        outcome: Result<String, String>,
        now: DateTime<Utc>,
    ) {
        let status = match &outcome {
            Ok(_) => SubTaskStatus::Completed,
            Err(_) => SubTaskStatus::Failed,
        };

        let mut queue_id = None;
        if let Some(orchestration) = self.orchestrations.get_mut(&commander_id) {
            if let Some(task) = orchestration.subtasks.get_mut(index) {
                task.status = status;
                task.finished_at = Some(now);
                queue_id = task.external_task_id.as_deref().and_then(|id| id.parse().ok());
                match outcome {
                    Ok(result) => task.result = Some(result),
                    Err(error) => task.error = Some(error),
                }
            }
        }
        if let Some(queue_id) = queue_id {
            match status {
                SubTaskStatus::Completed => self.queue.mark_completed(queue_id),
                SubTaskStatus::Failed => self.queue.mark_failed(queue_id),
                _ => {}
            }
        }
        self.scheduler.set_status(commander_id, index, status, now);

        self.release_agent(commander_id, agent, now);
        let started = self.concurrency.task_finished();
        self.requeue_started(started, now);

        self.tick(commander_id, now);
    }

    fn release_agent(&mut self, commander_id: CommanderId, agent: SubAgentId, now: DateTime<Utc>) {
        let role = self
            .contexts
            .get(&commander_id)
            .and_then(|c| c.agents.get(&agent))
            .copied()
            .unwrap_or(Role::Developer);

        let pressure = self.cleanup.compute_pressure();
        let retained = self.pool.release(role, agent, pressure);

        if retained {
            self.agent_states.insert(agent, LifecycleState::Pooled);
            self.cleanup.mark_idle(agent, now);
            ORCHESTRATOR_METRICS.record_pool_event("recycled");
        } else {
            self.agent_states.insert(agent, LifecycleState::Destroyed);
            self.cleanup.remove(agent);
            ORCHESTRATOR_METRICS.record_pool_event("evicted");
        }
    }

    /// Re-dispatch any sub-tasks the concurrency controller admitted while draining
    /// its queue after a completion (these were already priced into `active_count`;
    /// we only need to actually start their CLI processes).
    fn requeue_started(&mut self, started: Vec<(CommanderId, usize, Model)>, now: DateTime<Utc>) {
        for (commander_id, index, _model) in started {
            self.start_subtask_process(commander_id, index, now);
        }
    }

    fn start_synthesis(&mut self, commander_id: CommanderId, now: DateTime<Utc>) {
        let (Some(orchestration), Some(context)) = (
            self.orchestrations.get_mut(&commander_id),
            self.contexts.get(&commander_id),
        ) else {
            return;
        };
        if orchestration.phase == Phase::Synthesizing || orchestration.phase.is_terminal() {
            return;
        }
        orchestration.phase = Phase::Synthesizing;

        let prompt = compose_synthesis_prompt(orchestration, self.synthesis_result_prefix_len);
        let workspace = context.workspace.clone();
        let model = context.model;

        match self.spawn_tracked(SubAgentId::new(), commander_id, Purpose::Synthesis, &workspace, &prompt, model, now) {
            Ok(_) => {}
            Err(err) => {
                tracing::error!(commander = %commander_id, error = %err, "synthesis spawn failed");
                self.on_synthesis_terminal(commander_id, Err(err.to_string()), now);
            }
        }
    }

    fn on_synthesis_terminal(&mut self, commander_id: CommanderId, outcome: Result<String, String>, now: DateTime<Utc>) {
        let (result, commander_status) = match outcome {
            Ok(text) => (Some(text), CommanderStatus::Completed),
            Err(error) => (Some(format!("Synthesis failed: {error}")), CommanderStatus::Error),
        };

        if let Some(orchestration) = self.orchestrations.get_mut(&commander_id) {
            orchestration.phase = Phase::Completed;
            orchestration.synthesis_result = result;
            orchestration.completed_at = Some(now);
        }
        if let Some(commander) = self.commanders.get_mut(&commander_id) {
            commander.status = commander_status;
        }

        self.disband(commander_id, now);
    }

    /// Drop per-commander bookkeeping. Any sub-agent still genuinely active (not
    /// already pooled or destroyed by an earlier `release_agent`/cancel) is released
    /// here as a safety net — this only fires for agents a cancel interrupted mid-flight,
    /// since the normal completion path already released each one as it finished.
    fn disband(&mut self, commander_id: CommanderId, now: DateTime<Utc>) {
        if let Some(context) = self.contexts.remove(&commander_id) {
            let pressure = self.cleanup.compute_pressure();
            for (agent, role) in context.agents {
                let already_settled = matches!(
                    self.agent_states.get(&agent).copied(),
                    Some(LifecycleState::Destroyed) | Some(LifecycleState::Pooled)
                );
                if !already_settled {
                    let retained = self.pool.release(role, agent, pressure);
                    if retained {
                        self.agent_states.insert(agent, LifecycleState::Pooled);
                        self.cleanup.mark_idle(agent, now);
                    } else {
                        self.agent_states.insert(agent, LifecycleState::Destroyed);
                        self.cleanup.remove(agent);
                    }
                }
            }
        }
        self.scheduler.remove_orchestration(commander_id);
        let active_count = self.active_agent_count();
        self.concurrency.reset_for_commander(commander_id, active_count);
        self.queue.purge_commander(commander_id);
    }

    fn spawn_tracked(
        &mut self,
        agent: SubAgentId,
        commander_id: CommanderId,
        purpose: Purpose,
        workspace: &std::path::Path,
        prompt: &str,
        model: Model,
        now: DateTime<Utc>,
    ) -> Result<ProcessHandle, OrchestratorError> {
        let handle = self.runtime.spawn(agent, workspace, prompt, model, self.max_turns)?;
        self.purposes.insert(agent, (commander_id, purpose));

        let from = self.agent_states.get(&agent).copied().unwrap_or(LifecycleState::Initializing);
        if let Ok(to) = lifecycle::try_transition(&mut self.transition_log, agent, from, "spawned", now) {
            self.agent_states.insert(agent, to);
        }

        Ok(handle)
    }

    fn active_agent_count(&self) -> usize {
        self.agent_states
            .values()
            .filter(|s| s.counts_as_active())
            .count()
    }

    /// Read-only access to one orchestration's current record.
    #[must_use]
    pub fn orchestration(&self, commander_id: CommanderId) -> Option<&Orchestration> {
        self.orchestrations.get(&commander_id)
    }
}

fn compose_synthesis_prompt(orchestration: &Orchestration, prefix_len: usize) -> String {
    let mut body = String::from(
        "Synthesize the results of the following sub-tasks into one final answer.\n\n",
    );
    for task in &orchestration.subtasks {
        let marker = if task.status == SubTaskStatus::Completed {
            "COMPLETED"
        } else {
            "FAILED"
        };
        let detail = task
            .result
            .as_deref()
            .or(task.error.as_deref())
            .unwrap_or("");
        let prefix: String = detail.chars().take(prefix_len).collect();
        body.push_str(&format!("[{marker}] {}: {prefix}\n", task.title));
    }
    body.push_str(
        "\nVerify the combined result is internally consistent. Fix any inconsistencies \
         between sub-task outputs. Summarize what was accomplished. Note any sub-tasks \
         that failed and what remains undone.",
    );
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).expect("valid timestamp")
    }

    #[test]
    fn should_decompose_delegates_to_heuristic() {
        assert!(!Orchestrator::should_decompose("fix bug"));
        assert!(Orchestrator::should_decompose(
            "refactor the authentication module and add tests and update docs"
        ));
    }

    #[test]
    fn compose_synthesis_prompt_marks_completed_and_failed() {
        let orchestration = Orchestration {
            commander_id: CommanderId::new(),
            original_prompt: String::new(),
            subtasks: vec![
                SubTask {
                    index: 0,
                    title: "a".into(),
                    prompt: String::new(),
                    dependencies: vec![],
                    can_parallel: false,
                    priority: Priority::Medium,
                    status: SubTaskStatus::Completed,
                    assigned_agent: None,
                    external_task_id: None,
                    result: Some("did the thing".into()),
                    error: None,
                    started_at: None,
                    finished_at: None,
                },
                SubTask {
                    index: 1,
                    title: "b".into(),
                    prompt: String::new(),
                    dependencies: vec![0],
                    can_parallel: false,
                    priority: Priority::Medium,
                    status: SubTaskStatus::Failed,
                    assigned_agent: None,
                    external_task_id: None,
                    result: None,
                    error: Some("Dependency failed".into()),
                    started_at: None,
                    finished_at: None,
                },
            ],
            phase: Phase::Synthesizing,
            wave: 1,
            synthesis_result: None,
            created_at: now(),
            completed_at: None,
        };

        let prompt = compose_synthesis_prompt(&orchestration, 800);
        assert!(prompt.contains("[COMPLETED] a: did the thing"));
        assert!(prompt.contains("[FAILED] b: Dependency failed"));
    }

    #[tokio::test]
    async fn submit_trivial_prompt_uses_fallback_path_without_planner_call() {
        // `submit` is synchronous, but the fallback path still spawns processes via
        // `tokio::process::Command`, which requires an active Tokio reactor.
        let (mut orchestrator, _rx) = Orchestrator::new("claude", 10);
        let workspace = std::env::temp_dir();
        let commander_id = orchestrator
            .submit("fix bug".to_string(), Model::Sonnet, workspace, now())
            .expect("fallback submit should not require spawning a binary check beyond workspace dir");

        let orchestration = orchestrator.orchestration(commander_id).expect("orchestration exists");
        assert_eq!(orchestration.subtasks.len(), 2);
        assert_eq!(orchestration.phase, Phase::Executing);
    }

    proptest::proptest! {
        #[test]
        fn synthesis_prompt_never_exceeds_prefix_times_subtask_count(
            prefix_len in 0usize..2000,
            result_lens in proptest::collection::vec(0usize..3000, 0..8),
        ) {
            let subtasks = result_lens
                .into_iter()
                .enumerate()
                .map(|(index, len)| SubTask {
                    index,
                    title: format!("t{index}"),
                    prompt: String::new(),
                    dependencies: vec![],
                    can_parallel: false,
                    priority: Priority::Medium,
                    status: SubTaskStatus::Completed,
                    assigned_agent: None,
                    external_task_id: None,
                    result: Some("x".repeat(len)),
                    error: None,
                    started_at: None,
                    finished_at: None,
                })
                .collect::<Vec<_>>();

            let orchestration = Orchestration {
                commander_id: CommanderId::new(),
                original_prompt: String::new(),
                subtasks,
                phase: Phase::Synthesizing,
                wave: 0,
                synthesis_result: None,
                created_at: now(),
                completed_at: None,
            };

            let prompt = compose_synthesis_prompt(&orchestration, prefix_len);
            for task in &orchestration.subtasks {
                let detail = task.result.as_deref().unwrap_or("");
                let truncated: String = detail.chars().take(prefix_len).collect();
                prop_assert!(prompt.contains(&truncated) || truncated.is_empty());
            }
        }
    }
}
