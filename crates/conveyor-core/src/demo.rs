//! Demo task set: a slow task, a flaky task with retries, an idempotent
//! order task, a periodic task and a fire-and-forget notification.
//!
//! Durations come from `DemoConfig` so tests can run them on paused time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::app::{AppBuilder, IdempotencyGuard};
use crate::config::DemoConfig;
use crate::domain::{AckPolicy, HandlerError, RetryPolicy};
use crate::typed::{Handler, RegistryError, Task, TaskContext, TaskPolicy};

/// Names of every task `register_all` registers.
pub const EXPECTED_TASKS: &[&str] = &[
    LongRunning::NAME,
    FlakyTask::NAME,
    ProcessOrder::NAME,
    ScheduledDemo::NAME,
    WriteNotification::NAME,
];

#[derive(Debug, Clone, Deserialize)]
pub struct LongRunning {
    pub word: String,
}

impl Task for LongRunning {
    const NAME: &'static str = "long_running_task";
    type Output = String;
}

pub struct LongRunningHandler {
    duration: Duration,
}

#[async_trait]
impl Handler<LongRunning> for LongRunningHandler {
    async fn handle(&self, _ctx: &TaskContext, task: LongRunning) -> Result<String, HandlerError> {
        tokio::time::sleep(self.duration).await;
        Ok(format!("Processed: {}", task.word))
    }
}

/// Simulates a call to an unreliable external API.
#[derive(Debug, Clone, Deserialize)]
pub struct FlakyTask {
    pub input: String,
}

impl Task for FlakyTask {
    const NAME: &'static str = "task_with_retry";
    type Output = String;
}

pub struct FlakyHandler {
    failure_rate: f64,
}

#[async_trait]
impl Handler<FlakyTask> for FlakyHandler {
    async fn handle(&self, ctx: &TaskContext, task: FlakyTask) -> Result<String, HandlerError> {
        if rand::random::<f64>() < self.failure_rate {
            warn!(attempt = ctx.attempt, input = %task.input, "simulated failure");
            return Err(HandlerError::transient("Simulated network failure!"));
        }
        Ok(format!("Success: {}", task.input))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessOrder {
    pub order_id: String,
}

impl Task for ProcessOrder {
    const NAME: &'static str = "process_order";
    type Output = String;
}

/// Number of payments actually performed by `process_order`.
#[derive(Debug, Clone, Default)]
pub struct ChargeCounter(Arc<AtomicU64>);

impl ChargeCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn charge(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Charges an order at most once, however often it is delivered.
pub struct ProcessOrderHandler {
    guard: IdempotencyGuard,
    payment_time: Duration,
    charges: ChargeCounter,
}

#[async_trait]
impl Handler<ProcessOrder> for ProcessOrderHandler {
    async fn handle(&self, _ctx: &TaskContext, task: ProcessOrder) -> Result<String, HandlerError> {
        let key = format!("order:{}:processed", task.order_id);
        let claimed = self
            .guard
            .claim(&key)
            .await
            .map_err(|e| HandlerError::transient(e.to_string()))?;
        if !claimed {
            info!(order_id = %task.order_id, "order already processed, skipping");
            return Ok(format!("Order {} Skipped (Idempotent)", task.order_id));
        }

        tokio::time::sleep(self.payment_time).await;
        self.charges.charge();
        info!(order_id = %task.order_id, "order charged");
        Ok(format!("Order {} Processed Successfully", task.order_id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledDemo {}

impl Task for ScheduledDemo {
    const NAME: &'static str = "scheduled_task_demo";
    type Output = ();
}

pub struct ScheduledDemoHandler;

#[async_trait]
impl Handler<ScheduledDemo> for ScheduledDemoHandler {
    async fn handle(&self, ctx: &TaskContext, _task: ScheduledDemo) -> Result<(), HandlerError> {
        info!(task_id = %ctx.task_id, "CRON JOB EXECUTED");
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteNotification {
    pub email: String,
    pub message: String,
}

impl Task for WriteNotification {
    const NAME: &'static str = "write_notification";
    type Output = ();
}

pub struct WriteNotificationHandler {
    delay: Duration,
}

#[async_trait]
impl Handler<WriteNotification> for WriteNotificationHandler {
    async fn handle(
        &self,
        _ctx: &TaskContext,
        task: WriteNotification,
    ) -> Result<(), HandlerError> {
        tokio::time::sleep(self.delay).await;
        info!(email = %task.email, message = %task.message, "notification sent");
        Ok(())
    }
}

/// Register the demo tasks. The returned counter observes `process_order`
/// payments.
pub fn register_all(
    builder: AppBuilder,
    config: &DemoConfig,
    guard: IdempotencyGuard,
) -> Result<(AppBuilder, ChargeCounter), RegistryError> {
    let charges = ChargeCounter::default();
    let late = TaskPolicy::new().ack_policy(AckPolicy::Late);

    let builder = builder
        .register::<LongRunning, _>(
            LongRunningHandler {
                duration: Duration::from_secs(config.long_running_secs),
            },
            late.clone(),
        )?
        .register::<FlakyTask, _>(
            FlakyHandler {
                failure_rate: config.flaky_failure_rate,
            },
            late.clone().retry(RetryPolicy::transient(5)),
        )?
        .register::<ProcessOrder, _>(
            ProcessOrderHandler {
                guard,
                payment_time: Duration::from_millis(config.order_payment_ms),
                charges: charges.clone(),
            },
            late,
        )?
        .register::<ScheduledDemo, _>(ScheduledDemoHandler, TaskPolicy::new())?
        .register::<WriteNotification, _>(
            WriteNotificationHandler {
                delay: Duration::from_secs(config.notification_secs),
            },
            TaskPolicy::new(),
        )?;
    Ok((builder, charges))
}
