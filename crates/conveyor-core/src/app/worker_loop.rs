//! WorkerLoop - consume, execute, record, ack.
//!
//! # Flow per delivery
//! 1. Resolve the task name. Unknown names are recorded as `Failure` and
//!    acked: redelivering them would fail the same way forever.
//! 2. Record `Start` (increments `attempt_count`). A record that is already
//!    terminal means this is a duplicate of finished work; ack and skip.
//! 3. Run the handler on its own tokio task. A panic is caught at the join
//!    and becomes a permanent failure, so the worker survives it.
//! 4. Record `Success`, or consult the retry policy and record `Retrying`
//!    (re-publishing with the backoff delay) or `Failure`.
//! 5. Ack.
//!
//! If bookkeeping fails the delivery is dropped without an ack. For late-ack
//! invocations the broker then hands it out again, which is the at-least-once
//! guarantee: a crash anywhere before step 5 means another execution, never a
//! lost one.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::domain::{
    Decision, HandlerError, StoreError, TaskInvocation, TaskId, TransportError, Transition, decide,
};
use crate::ports::{Broker, Delivery, ResultStore};
use crate::typed::{DynHandler, TaskContext, TaskRegistry};

/// Pause after a broker or store error before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct WorkerLoop {
    worker_id: usize,
    queue: String,
    broker: Arc<dyn Broker>,
    store: Arc<dyn ResultStore>,
    registry: Arc<TaskRegistry>,
}

/// Whether the delivery may be acked after a bookkeeping step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bookkeeping {
    Recorded,
    /// The record had already moved on (duplicate delivery).
    Stale,
    /// The store is unreachable; leave the message with the broker.
    Unavailable,
}

impl WorkerLoop {
    pub fn new(
        queue: impl Into<String>,
        broker: Arc<dyn Broker>,
        store: Arc<dyn ResultStore>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            worker_id: 0,
            queue: queue.into(),
            broker,
            store,
            registry,
        }
    }

    pub fn with_id(mut self, worker_id: usize) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Consume until `shutdown` flips to `true` (or its sender is dropped) or
    /// the broker closes.
    ///
    /// Shutdown only stops taking new deliveries; the one in progress runs to
    /// completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = self.worker_id, queue = %self.queue, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = self.broker.consume(&self.queue) => delivery,
            };

            match delivery {
                Ok(delivery) => self.process(delivery).await,
                Err(TransportError::Closed) => {
                    info!(worker_id = self.worker_id, "broker closed");
                    break;
                }
                Err(err) => {
                    warn!(worker_id = self.worker_id, error = %err, "consume failed");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
        info!(worker_id = self.worker_id, "worker stopped");
    }

    /// Execute one delivery end to end.
    pub async fn process(&self, delivery: Box<dyn Delivery>) {
        let invocation = delivery.invocation().clone();
        let span = info_span!(
            "task",
            worker_id = self.worker_id,
            task_id = %invocation.task_id(),
            task = %invocation.task_name(),
            redelivered = delivery.redelivered(),
        );
        self.execute(delivery, invocation).instrument(span).await
    }

    async fn execute(&self, delivery: Box<dyn Delivery>, invocation: TaskInvocation) {
        let task_id = invocation.task_id();

        let task = match self.registry.resolve(invocation.task_name()) {
            Ok(task) => task,
            Err(unknown) => {
                warn!("no handler registered");
                let error = HandlerError::from(unknown).to_string();
                if self.record(task_id, Transition::Fail { error }).await
                    != Bookkeeping::Unavailable
                {
                    ack(delivery).await;
                }
                return;
            }
        };

        let attempt = match self.store.apply(task_id, Transition::Start).await {
            Ok(record) => record.attempt_count,
            Err(StoreError::InvalidTransition { source, .. }) => {
                warn!(state = %source.from, "record already finished, skipping duplicate delivery");
                ack(delivery).await;
                return;
            }
            Err(err) => {
                error!(error = %err, "cannot record start, leaving message for redelivery");
                tokio::time::sleep(ERROR_BACKOFF).await;
                return;
            }
        };

        let ctx = TaskContext {
            task_id,
            task_name: invocation.task_name().clone(),
            attempt,
            redelivered: delivery.redelivered(),
        };
        debug!(attempt, "invoking handler");

        let outcome = invoke(
            Arc::clone(task.handler()),
            ctx,
            invocation.arguments().to_vec(),
        )
        .await;
        let transition = match outcome {
            Ok(result) => {
                info!(attempt, "task succeeded");
                Transition::Succeed { result }
            }
            Err(err) => match decide(&task.policy().retry, attempt, &err) {
                Decision::Retry { delay, reason } => {
                    warn!(attempt, error = %err, %reason, "task failed, retrying");
                    let bookkeeping = self
                        .record(task_id, Transition::Retry { error: err.to_string() })
                        .await;
                    match bookkeeping {
                        Bookkeeping::Unavailable => return,
                        Bookkeeping::Stale => {
                            ack(delivery).await;
                            return;
                        }
                        Bookkeeping::Recorded => {}
                    }
                    if let Err(publish_err) = self
                        .broker
                        .publish_after(&self.queue, invocation.clone(), delay)
                        .await
                    {
                        // Not acking hands the original delivery back instead.
                        error!(error = %publish_err, "cannot schedule retry");
                        return;
                    }
                    ack(delivery).await;
                    return;
                }
                Decision::Fail { reason } => {
                    error!(attempt, error = %err, %reason, "task failed");
                    Transition::Fail { error: err.to_string() }
                }
            },
        };

        if self.record(task_id, transition).await != Bookkeeping::Unavailable {
            ack(delivery).await;
        }
    }

    async fn record(&self, task_id: TaskId, transition: Transition) -> Bookkeeping {
        match self.store.apply(task_id, transition).await {
            Ok(_) => Bookkeeping::Recorded,
            Err(StoreError::InvalidTransition { source, .. }) => {
                warn!(from = %source.from, to = %source.to, "record moved on concurrently");
                Bookkeeping::Stale
            }
            Err(err) => {
                error!(error = %err, "cannot record outcome, leaving message for redelivery");
                Bookkeeping::Unavailable
            }
        }
    }
}

/// Aborts the handler task if the worker future is dropped mid-handler.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn invoke(
    handler: Arc<dyn DynHandler>,
    ctx: TaskContext,
    arguments: Vec<Value>,
) -> Result<Value, HandlerError> {
    let mut join = tokio::spawn(
        async move { handler.handle_dyn(&ctx, &arguments).await }.instrument(Span::current()),
    );
    let _abort = AbortOnDrop(join.abort_handle());
    match (&mut join).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => {
            let message = panic_message(err.into_panic());
            error!(panic = %message, "handler panicked");
            Err(HandlerError::permanent(format!("handler panicked: {message}")))
        }
        Err(err) => Err(HandlerError::transient(format!("handler cancelled: {err}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "non-string panic payload".to_string(), |s| s.to_string()),
    }
}

async fn ack(delivery: Box<dyn Delivery>) {
    if let Err(err) = delivery.ack().await {
        warn!(error = %err, "ack failed");
    }
}
