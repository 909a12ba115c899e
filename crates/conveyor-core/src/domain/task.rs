use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Registered name of a task, the dispatch key between producers and workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskName(String);

impl TaskName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// When the broker may forget a delivered invocation.
///
/// - `Eager`: as soon as a worker receives it. A crash mid-execution loses it.
/// - `Late`: only after the worker recorded the outcome. A crash mid-execution
///   causes redelivery, so the handler may observe the invocation twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    Eager,
    #[default]
    Late,
}

/// One unit of work travelling through the broker. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    task_id: TaskId,
    task_name: TaskName,
    arguments: Vec<serde_json::Value>,
    submitted_at: DateTime<Utc>,
    ack_policy: AckPolicy,
}

impl TaskInvocation {
    pub fn new(
        task_id: TaskId,
        task_name: TaskName,
        arguments: Vec<serde_json::Value>,
        submitted_at: DateTime<Utc>,
        ack_policy: AckPolicy,
    ) -> Self {
        Self {
            task_id,
            task_name,
            arguments,
            submitted_at,
            ack_policy,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_name(&self) -> &TaskName {
        &self.task_name
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.ack_policy
    }
}
