use crate::domain::{TaskId, TaskName};

/// What a handler knows about the delivery it is executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub task_name: TaskName,
    /// 1 on the first invocation, incremented on every retry or redelivery.
    pub attempt: u32,
    /// The broker handed this invocation out before (late-ack redelivery).
    pub redelivered: bool,
}
