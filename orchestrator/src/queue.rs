//! Durable task-queue mirror for crash/interruption recovery.
//!
//! This module defines the operations a persistence layer would replay against to
//! reconstruct an in-flight orchestration after a restart. It does not define a wire
//! format; callers serialize `TaskQueueItem` however their storage layer requires.

use crate::model::{CommanderId, SubAgentId, SubTaskStatus, TaskQueueItem};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// In-memory mirror of durable task-queue rows, keyed by queue id.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: HashMap<uuid::Uuid, TaskQueueItem>,
}

impl TaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new queue row for a sub-task about to be scheduled.
    pub fn enqueue(
        &mut self,
        commander_id: CommanderId,
        subtask_index: usize,
        title: String,
        prompt: String,
        dependencies: Vec<usize>,
        now: DateTime<Utc>,
    ) -> uuid::Uuid {
        let queue_id = uuid::Uuid::new_v4();
        self.items.insert(
            queue_id,
            TaskQueueItem {
                queue_id,
                commander_id,
                subtask_index,
                title,
                prompt,
                assigned_agent: None,
                dependencies,
                status: SubTaskStatus::Pending,
                enqueued_at: now,
                started_at: None,
            },
        );
        queue_id
    }

    /// Record that a row has been assigned a sub-agent and has started running.
    pub fn mark_started(&mut self, queue_id: uuid::Uuid, agent: SubAgentId, now: DateTime<Utc>) {
        if let Some(item) = self.items.get_mut(&queue_id) {
            item.assigned_agent = Some(agent);
            item.status = SubTaskStatus::InProgress;
            item.started_at = Some(now);
        }
    }

    /// Mark a row completed. The row is retained (not removed) so a resumed run can
    /// tell completed work apart from work never dispatched.
    pub fn mark_completed(&mut self, queue_id: uuid::Uuid) {
        if let Some(item) = self.items.get_mut(&queue_id) {
            item.status = SubTaskStatus::Completed;
        }
    }

    /// Mark a row failed.
    pub fn mark_failed(&mut self, queue_id: uuid::Uuid) {
        if let Some(item) = self.items.get_mut(&queue_id) {
            item.status = SubTaskStatus::Failed;
        }
    }

    /// Look up a single row.
    #[must_use]
    pub fn get(&self, queue_id: uuid::Uuid) -> Option<&TaskQueueItem> {
        self.items.get(&queue_id)
    }

    /// All rows belonging to a commander, for reconstructing an orchestration on resume.
    #[must_use]
    pub fn for_commander(&self, commander_id: CommanderId) -> Vec<&TaskQueueItem> {
        let mut rows: Vec<&TaskQueueItem> = self
            .items
            .values()
            .filter(|item| item.commander_id == commander_id)
            .collect();
        rows.sort_by_key(|item| item.subtask_index);
        rows
    }

    /// Remove all rows for a commander once its orchestration has fully completed.
    pub fn purge_commander(&mut self, commander_id: CommanderId) {
        self.items.retain(|_, item| item.commander_id != commander_id);
    }
}
