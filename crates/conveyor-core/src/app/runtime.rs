//! Runtime - wires backends, producer, worker pool and scheduler together.
//!
//! # Deployment shapes
//! - **Worker process**: `Runtime::start` with `RuntimeOptions::from_settings`,
//!   consuming a shared broker; beat enabled on exactly one of them.
//! - **In-process**: `Runtime::in_process` puts an in-memory broker, stores
//!   and a single worker in the caller's process. Fire-and-forget work goes
//!   through the same producer/worker path as everything else.
//!
//! ```ignore
//! let runtime = Runtime::in_process(&app);
//! runtime.producer().enqueue("write_notification", args).await?;
//! // Let the queue run dry before stopping, or queued work is dropped.
//! runtime.drain().await?;
//! runtime.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use super::builder::App;
use super::gc_loop::{GcHandle, GcLoop};
use super::idempotency::IdempotencyGuard;
use super::producer::{DEFAULT_QUEUE, Producer};
use super::scheduler::{ScheduleSpec, Scheduler, SchedulerHandle};
use super::status::StatusReader;
use super::worker_loop::WorkerLoop;
use super::worker_pool::WorkerPool;
use crate::config::Settings;
use crate::domain::{AckPolicy, TaskExecutionRecord, TaskName, TransportError};
use crate::error::ConveyorError;
use crate::impls::{InMemoryBroker, InMemoryClaimStore, InMemoryResultStore};
use crate::ports::{Broker, ClaimStore, Clock, ResultStore, SystemClock};

/// How often `run_to_completion` polls the result store.
const COMPLETION_POLL: Duration = Duration::from_millis(50);

/// The shared infrastructure a process talks to.
#[derive(Clone)]
pub struct Backends {
    pub broker: Arc<dyn Broker>,
    pub results: Arc<dyn ResultStore>,
    pub claims: Arc<dyn ClaimStore>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// In-memory broker and stores on the system clock.
    pub fn in_memory(result_ttl: Option<Duration>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let results = InMemoryResultStore::new(Arc::clone(&clock));
        let results = match result_ttl {
            Some(ttl) => results.with_ttl(ttl),
            None => results,
        };
        Self {
            broker: Arc::new(InMemoryBroker::new()),
            results: Arc::new(results),
            claims: Arc::new(InMemoryClaimStore::new()),
            clock,
        }
    }

    pub fn idempotency_guard(&self, ttl: Option<Duration>) -> IdempotencyGuard {
        IdempotencyGuard::new(Arc::clone(&self.claims), Arc::clone(&self.clock)).with_ttl(ttl)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    pub queue: String,
    pub concurrency: usize,
    pub default_ack: AckPolicy,
    pub beat: bool,
    pub schedule: Vec<ScheduleSpec>,
    /// How often the scheduler checks for due entries.
    pub beat_tick: Duration,
    /// Period of the expired-entry sweep. `None` leaves eviction to reads.
    pub sweep_every: Option<Duration>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            concurrency: 4,
            default_ack: AckPolicy::Late,
            beat: false,
            schedule: Vec::new(),
            beat_tick: Duration::from_secs(1),
            sweep_every: Some(Duration::from_secs(60)),
        }
    }
}

impl RuntimeOptions {
    /// One worker, no scheduler.
    pub fn in_process() -> Self {
        Self {
            concurrency: 1,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            queue: settings.broker.queue.clone(),
            concurrency: settings.worker.concurrency,
            default_ack: settings.worker.ack_policy,
            beat: settings.beat.enabled,
            schedule: settings.schedule_specs(),
            sweep_every: settings.sweep_interval(),
            ..Self::default()
        }
    }
}

pub struct Runtime {
    backends: Backends,
    producer: Producer,
    status: StatusReader,
    queue: String,
    pool: WorkerPool,
    scheduler: Option<SchedulerHandle>,
    gc: Option<GcHandle>,
}

impl Runtime {
    /// Spawn the worker pool, the sweep and (if enabled) the scheduler on the
    /// current tokio runtime. A `concurrency` of 0 is raised to 1.
    pub fn start(app: &App, backends: &Backends, options: RuntimeOptions) -> Self {
        let concurrency = if options.concurrency == 0 {
            warn!("concurrency 0 would start no workers, using 1");
            1
        } else {
            options.concurrency
        };
        let registry = Arc::clone(app.registry());
        let producer = Producer::new(Arc::clone(&backends.broker), Arc::clone(&backends.clock))
            .with_queue(options.queue.clone())
            .with_default_ack(options.default_ack)
            .with_ack_policies(registry.ack_policies());
        let status = StatusReader::new(Arc::clone(&backends.results), Arc::clone(&backends.clock));

        let worker = WorkerLoop::new(
            options.queue.clone(),
            Arc::clone(&backends.broker),
            Arc::clone(&backends.results),
            registry,
        );
        let pool = WorkerPool::spawn(concurrency, worker);

        let scheduler = (options.beat && !options.schedule.is_empty()).then(|| {
            Scheduler::new(producer.clone(), Arc::clone(&backends.clock), options.schedule)
                .spawn(options.beat_tick)
        });
        let gc = options
            .sweep_every
            .filter(|every| !every.is_zero())
            .map(|every| {
                GcLoop::new(Arc::clone(&backends.results), Arc::clone(&backends.claims))
                    .spawn(every)
            });

        info!(
            queue = %options.queue,
            concurrency,
            beat = scheduler.is_some(),
            sweep = gc.is_some(),
            "runtime started"
        );
        Self {
            backends: backends.clone(),
            producer,
            status,
            queue: options.queue,
            pool,
            scheduler,
            gc,
        }
    }

    /// Fresh in-memory backends, one worker, no scheduler.
    pub fn in_process(app: &App) -> Self {
        Self::start(app, &Backends::in_memory(None), RuntimeOptions::in_process())
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn status(&self) -> &StatusReader {
        &self.status
    }

    /// Enqueue and wait until the record is terminal.
    pub async fn run_to_completion(
        &self,
        task_name: impl Into<TaskName>,
        arguments: Vec<Value>,
    ) -> Result<TaskExecutionRecord, ConveyorError> {
        let task_id = self.producer.enqueue(task_name, arguments).await?;
        Ok(self.status.wait_for_terminal(task_id, COMPLETION_POLL).await?)
    }

    pub fn concurrency(&self) -> usize {
        self.pool.size()
    }

    /// Wait until the broker holds nothing for this runtime's queue: no
    /// ready, delayed or unacked messages. Pending retries are waited for too.
    ///
    /// With the scheduler running the queue may never stay empty, so call
    /// this on runtimes without beat.
    pub async fn drain(&self) -> Result<(), TransportError> {
        loop {
            let outstanding = self.backends.broker.outstanding(&self.queue).await?;
            if outstanding == 0 {
                return Ok(());
            }
            tokio::time::sleep(COMPLETION_POLL).await;
        }
    }

    /// Stop taking new work and wait for in-flight tasks.
    ///
    /// Messages still queued stay on the broker. For the in-memory broker
    /// that means they are dropped with it; `drain` first to run them.
    pub async fn shutdown(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown().await;
        }
        self.pool.shutdown_and_join().await;
        if let Some(gc) = self.gc {
            gc.shutdown().await;
        }
        info!("runtime stopped");
    }
}
