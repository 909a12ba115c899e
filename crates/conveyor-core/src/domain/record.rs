//! Task execution record: the result store's view of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskState;

/// A requested state change, applied atomically by the result store.
///
/// Stores never expose a read-then-write API: callers describe the change and
/// the store validates it against the current record under its own lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A worker is about to invoke the handler (increments `attempt_count`).
    Start,
    Succeed { result: serde_json::Value },
    Retry { error: String },
    Fail { error: String },
}

impl Transition {
    /// State the record ends up in after this transition.
    pub fn target(&self) -> TaskState {
        match self {
            Transition::Start => TaskState::Started,
            Transition::Succeed { .. } => TaskState::Success,
            Transition::Retry { .. } => TaskState::Retrying,
            Transition::Fail { .. } => TaskState::Failure,
        }
    }
}

/// Rejected transition; the record is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// Mutable execution record keyed by task id.
///
/// Invariants:
/// - `attempt_count` only increases and equals the number of handler invocations.
/// - Once `state` is terminal the record never changes again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub state: TaskState,
    pub attempt_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub last_updated: DateTime<Utc>,
}

impl TaskExecutionRecord {
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            state: TaskState::Pending,
            attempt_count: 0,
            result: None,
            error: None,
            last_updated: now,
        }
    }

    /// Apply `transition` if the state machine allows it.
    pub fn apply(
        &mut self,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let to = transition.target();
        let allowed = match (&transition, self.state) {
            (_, from) if from.is_terminal() => false,
            (Transition::Start, _) => true,
            (Transition::Succeed { .. } | Transition::Retry { .. }, TaskState::Started) => true,
            (Transition::Fail { .. }, TaskState::Started | TaskState::Pending) => true,
            _ => false,
        };
        if !allowed {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }

        match transition {
            Transition::Start => {
                self.attempt_count += 1;
            }
            Transition::Succeed { result } => {
                self.result = Some(result);
            }
            Transition::Retry { error } | Transition::Fail { error } => {
                self.error = Some(error);
            }
        }
        self.state = to;
        self.last_updated = now;
        Ok(())
    }
}
