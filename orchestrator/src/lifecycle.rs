//! Sub-agent lifecycle state machine and its bounded transition logger.
//!
//! The transition log uses a batch-eviction policy grounded in the pattern from
//! `acbc7fda_Snehal-Reddy-iCrab`'s `prune_completed`: instead of shifting on every
//! push once a cap is reached, remove the oldest 20% in one pass.

use crate::model::{LifecycleState as S, SubAgentId};
use chrono::{DateTime, Utc};

/// Default capacity of the transition log before batch eviction kicks in.
pub const TRANSITION_LOG_CAPACITY: usize = 500;

/// Fraction of the log evicted, oldest-first, once it is full.
const EVICTION_FRACTION: f64 = 0.2;

/// An event name driving a lifecycle transition. Kept as a string so the allow-list
/// can be expressed as simple `(event, from, to)` tuples without a combinatorial enum.
pub type Event = &'static str;

/// The fixed allow-list of valid `(event, from_state, to_state)` transitions.
///
/// An attempted transition outside this list is rejected: the state is left
/// unchanged and the attempt is recorded as a rejected entry in the log.
const ALLOWED: &[(Event, S, S)] = &[
    ("spawned", S::Initializing, S::Idle),
    ("acquire", S::Idle, S::Working),
    ("acquire", S::Pooled, S::Idle),
    ("release", S::Idle, S::Pooled),
    ("start_working", S::Idle, S::Working),
    ("start_thinking", S::Working, S::Thinking),
    ("resume_working", S::Thinking, S::Working),
    ("request_permission", S::Working, S::RequestingPermission),
    ("request_permission", S::Thinking, S::RequestingPermission),
    ("ask_question", S::Working, S::WaitingForAnswer),
    ("ask_question", S::Thinking, S::WaitingForAnswer),
    ("review_plan", S::Working, S::ReviewingPlan),
    ("review_plan", S::Thinking, S::ReviewingPlan),
    ("answered", S::RequestingPermission, S::Working),
    ("answered", S::WaitingForAnswer, S::Working),
    ("answered", S::ReviewingPlan, S::Working),
    ("complete", S::Working, S::Completed),
    ("complete", S::Thinking, S::Completed),
    ("fail", S::Working, S::Error),
    ("fail", S::Thinking, S::Error),
    ("fail", S::RequestingPermission, S::Error),
    ("fail", S::WaitingForAnswer, S::Error),
    ("fail", S::ReviewingPlan, S::Error),
    ("suspend", S::Working, S::Suspended),
    ("suspend", S::Thinking, S::Suspended),
    ("suspend", S::Idle, S::SuspendedIdle),
    ("resume", S::Suspended, S::Working),
    ("resume", S::SuspendedIdle, S::Idle),
    ("teardown", S::Completed, S::Destroying),
    ("teardown", S::Error, S::Destroying),
    ("teardown", S::Idle, S::Destroying),
    ("destroyed", S::Destroying, S::Destroyed),
];

/// One recorded transition attempt, valid or rejected.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    /// Agent the transition was attempted on.
    pub agent: SubAgentId,
    /// Event name.
    pub event: Event,
    /// State before the attempt.
    pub from: S,
    /// State the attempt targeted.
    pub to: S,
    /// Whether the allow-list accepted this transition.
    pub accepted: bool,
    /// When the attempt occurred.
    pub at: DateTime<Utc>,
}

/// Bounded log of lifecycle transition attempts, batch-evicted when full.
#[derive(Debug, Default)]
pub struct TransitionLog {
    entries: Vec<TransitionRecord>,
    capacity: usize,
}

impl TransitionLog {
    /// Create a log with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            capacity: TRANSITION_LOG_CAPACITY,
        }
    }

    /// Create a log with an explicit capacity (used by tests to exercise eviction cheaply).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    fn push(&mut self, record: TransitionRecord) {
        self.entries.push(record);
        if self.entries.len() > self.capacity {
            let to_remove = ((self.capacity as f64) * EVICTION_FRACTION).ceil() as usize;
            let to_remove = to_remove.max(1).min(self.entries.len());
            self.entries.drain(0..to_remove);
        }
    }

    /// Current number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[TransitionRecord] {
        &self.entries
    }
}

/// Attempt a lifecycle transition for `agent`, validating against the fixed allow-list.
///
/// On success, returns `Ok(new_state)`. On rejection, the log still records the
/// attempt (for diagnostics) and this returns `Err` without mutating any state —
/// callers must not apply the transition themselves on an `Err`.
pub fn try_transition(
    log: &mut TransitionLog,
    agent: SubAgentId,
    from: S,
    event: Event,
    now: DateTime<Utc>,
) -> Result<S, crate::error::OrchestratorError> {
    let found = ALLOWED.iter().find(|(e, f, _)| *e == event && *f == from);

    match found {
        Some((_, _, to)) => {
            log.push(TransitionRecord {
                agent,
                event,
                from,
                to: *to,
                accepted: true,
                at: now,
            });
            Ok(*to)
        }
        None => {
            // We don't know the attempted target state without it being in the
            // allow-list; record the attempt against `from` for diagnostics and
            // surface an error the caller logs and discards (spec: never surfaced
            // to the user, transition is simply rejected).
            log.push(TransitionRecord {
                agent,
                event,
                from,
                to: from,
                accepted: false,
                at: now,
            });
            Err(crate::error::OrchestratorError::InvalidTransition {
                event: event.to_string(),
                from,
                to: from,
            })
        }
    }
}
