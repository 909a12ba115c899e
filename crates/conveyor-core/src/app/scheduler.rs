//! Scheduler ("beat") - fires periodic invocations through the producer.
//!
//! Each entry fires once per `interval`, measured from the last successful
//! fire (the first fire happens one interval after start). The scheduler is
//! just another producer: workers cannot tell scheduled invocations from
//! submitted ones.
//!
//! Exactly one scheduler may be active against a given broker. Two of them
//! would both fire every entry; nothing here detects that.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::producer::Producer;
use crate::domain::{TaskId, TaskName};
use crate::ports::Clock;

/// A periodic entry as configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSpec {
    pub name: String,
    pub task: TaskName,
    pub args: Vec<Value>,
    pub interval: Duration,
}

impl ScheduleSpec {
    pub fn new(name: impl Into<String>, task: impl Into<TaskName>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
            args: Vec::new(),
            interval,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// A spec plus the time it last fired.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEntry {
    pub spec: ScheduleSpec,
    pub last_fired: DateTime<Utc>,
}

impl ScheduledEntry {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        (now - self.last_fired)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= self.spec.interval)
    }
}

pub struct Scheduler {
    producer: Producer,
    clock: Arc<dyn Clock>,
    entries: Vec<ScheduledEntry>,
}

impl Scheduler {
    pub fn new(producer: Producer, clock: Arc<dyn Clock>, specs: Vec<ScheduleSpec>) -> Self {
        let now = clock.now();
        let entries = specs
            .into_iter()
            .map(|spec| ScheduledEntry {
                spec,
                last_fired: now,
            })
            .collect();
        Self {
            producer,
            clock,
            entries,
        }
    }

    pub fn entries(&self) -> &[ScheduledEntry] {
        &self.entries
    }

    /// Fire every entry that is due and return the ids that were enqueued.
    ///
    /// An entry whose publish fails keeps its old `last_fired`, so it is
    /// attempted again on the next tick.
    pub async fn tick(&mut self) -> Vec<TaskId> {
        let now = self.clock.now();
        let mut fired = Vec::new();
        for entry in &mut self.entries {
            if !entry.is_due(now) {
                continue;
            }
            match self
                .producer
                .enqueue(entry.spec.task.clone(), entry.spec.args.clone())
                .await
            {
                Ok(task_id) => {
                    info!(
                        schedule = %entry.spec.name,
                        task = %entry.spec.task,
                        %task_id,
                        "scheduled task fired"
                    );
                    entry.last_fired = now;
                    fired.push(task_id);
                }
                Err(err) => {
                    warn!(schedule = %entry.spec.name, error = %err, "scheduled publish failed");
                }
            }
        }
        fired
    }

    /// Tick every `every` until `shutdown` flips (or its sender is dropped).
    pub async fn run(mut self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(entries = self.entries.len(), "scheduler started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let fired = self.tick().await;
                    debug!(fired = fired.len(), "scheduler tick");
                }
            }
        }
        info!("scheduler stopped");
    }

    pub fn spawn(self, every: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(every, shutdown_rx));
        SchedulerHandle { shutdown_tx, join }
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
