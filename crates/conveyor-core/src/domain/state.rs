//! Execution state of a task.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State transitions:
/// - Pending -> Started -> Success
/// - Pending -> Started -> Retrying -> Started (loop while retries remain)
/// - Pending -> Started -> Failure
/// - Pending -> Failure (task name not registered)
/// - Started -> Started (late-ack redelivery after a worker crash)
///
/// Serialized in SCREAMING_SNAKE_CASE (`PENDING`, `SUCCESS`, ...), the names
/// status readers already expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Submitted, no worker has started it yet.
    Pending,

    /// A worker is executing the handler.
    Started,

    /// Failed with a retryable error; redelivery is scheduled after backoff.
    Retrying,

    Success,

    /// Failed permanently (not retryable, unknown task, or retries exhausted).
    Failure,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Retrying => "RETRYING",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}
