//! Producer - submits task invocations and returns immediately.
//!
//! The producer does not look at the registry: it may run in a process that
//! has no handlers at all. Unknown names are rejected on the worker side.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{AckPolicy, TaskId, TaskInvocation, TaskName, TransportError};
use crate::ports::{Broker, Clock, IdGenerator, UlidGenerator};

pub const DEFAULT_QUEUE: &str = "default";

/// What a submitting caller gets back: a message and the handle to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub message: String,
    pub task_id: TaskId,
}

/// Publishes invocations onto one queue.
///
/// Cheap to clone: every field is shared. Each clone stamps ids from the same
/// generator and publishes to the same broker.
///
/// ```ignore
/// let producer = Producer::new(broker, Arc::new(SystemClock))
///     .with_queue("orders")
///     .with_ack_policies(app.registry().ack_policies());
///
/// let receipt = producer
///     .submit("process_order", vec![json!("A1")], "Order received")
///     .await?;
/// println!("{} -> {}", receipt.message, receipt.task_id);
/// ```
#[derive(Clone)]
pub struct Producer {
    broker: Arc<dyn Broker>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    queue: String,
    default_ack: AckPolicy,
    ack_policies: Arc<HashMap<TaskName, AckPolicy>>,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>) -> Self {
        Self {
            broker,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            queue: DEFAULT_QUEUE.to_string(),
            default_ack: AckPolicy::default(),
            ack_policies: Arc::new(HashMap::new()),
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Ack policy for names missing from the per-task table.
    pub fn with_default_ack(mut self, ack: AckPolicy) -> Self {
        self.default_ack = ack;
        self
    }

    /// Per-task ack policies, typically `TaskRegistry::ack_policies()` when the
    /// producer shares a process with the registry.
    pub fn with_ack_policies(mut self, ack_policies: HashMap<TaskName, AckPolicy>) -> Self {
        self.ack_policies = Arc::new(ack_policies);
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Append one invocation to the broker and return its id.
    ///
    /// On `TransportError` nothing was enqueued.
    pub async fn enqueue(
        &self,
        task_name: impl Into<TaskName>,
        arguments: Vec<Value>,
    ) -> Result<TaskId, TransportError> {
        let task_name = task_name.into();
        let ack = self
            .ack_policies
            .get(&task_name)
            .copied()
            .unwrap_or(self.default_ack);
        self.enqueue_with(task_name, arguments, ack).await
    }

    pub async fn enqueue_with(
        &self,
        task_name: impl Into<TaskName>,
        arguments: Vec<Value>,
        ack_policy: AckPolicy,
    ) -> Result<TaskId, TransportError> {
        let task_id = self.ids.generate_task_id();
        let invocation = TaskInvocation::new(
            task_id,
            task_name.into(),
            arguments,
            self.clock.now(),
            ack_policy,
        );
        debug!(%task_id, task = %invocation.task_name(), queue = %self.queue, "enqueue");
        self.broker.publish(&self.queue, invocation).await?;
        Ok(task_id)
    }

    /// `enqueue` wrapped in a `Receipt`.
    pub async fn submit(
        &self,
        task_name: impl Into<TaskName>,
        arguments: Vec<Value>,
        message: impl Into<String>,
    ) -> Result<Receipt, TransportError> {
        let task_id = self.enqueue(task_name, arguments).await?;
        Ok(Receipt {
            message: message.into(),
            task_id,
        })
    }
}
