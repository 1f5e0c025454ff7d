//! Core data model.
//!
//! A trigger is an external request naming a job. Each accepted trigger fans
//! out into one or more work items, one per slot in the job's plan.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// An inbound request to start a named job. Immutable once received.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub id: TriggerId,
    /// Job name as supplied by the caller.
    pub name: String,
    pub received_at: DateTime<Utc>,
}

impl Trigger {
    /// Stamp a new trigger with a fresh id and the current time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TriggerId::new(),
            name: name.into(),
            received_at: Utc::now(),
        }
    }
}

/// Newtype for trigger IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(pub Uuid);

impl TriggerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One concurrently executing unit of work spawned for a trigger.
///
/// Created in `Pending` the moment it is registered with the tracker, before
/// it starts executing.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// The trigger this unit was dispatched for.
    pub trigger: Trigger,
    /// Which of the trigger's units this is, starting at 1.
    pub slot: usize,
    pub state: WorkState,
}

impl WorkItem {
    pub fn new(trigger: Trigger, slot: usize) -> Self {
        Self {
            trigger,
            slot,
            state: WorkState::Pending,
        }
    }

    /// Move to `to`, returning the previous state.
    ///
    /// Returns `None` and leaves the state untouched if the transition is not
    /// allowed.
    pub fn advance(&mut self, to: WorkState) -> Option<WorkState> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return None;
        }
        self.state = to;
        Some(from)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkState {
    /// Registered with the tracker, not yet executing.
    Pending,
    /// Work body executing.
    Running,
    /// Reported completion to the tracker. Terminal.
    Done,
}

impl WorkState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkState) -> bool {
        use WorkState::*;
        matches!((self, to), (Pending, Running) | (Running, Done))
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkState::Done)
    }
}

impl std::fmt::Display for WorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkState::Pending => "pending",
            WorkState::Running => "running",
            WorkState::Done => "done",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Acknowledgment
// ---------------------------------------------------------------------------

/// Returned to the caller as soon as a trigger's work is registered and
/// launched. Never waits for the work itself.
#[derive(Debug, Clone)]
pub struct Acknowledgment {
    pub trigger: Trigger,
    /// Number of work items dispatched for the trigger.
    pub units: usize,
    pub acknowledged_at: DateTime<Utc>,
}

impl Acknowledgment {
    /// Response body handed back to the caller.
    pub fn body(&self) -> String {
        format!("job {} started", self.trigger.name)
    }
}
