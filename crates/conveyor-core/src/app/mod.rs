//! App - the application layer, built from the ports.
//!
//! # Components
//! - **AppBuilder**: registers tasks, validates the wiring
//! - **Producer**: enqueues invocations
//! - **StatusReader**: read-only queries against the result store
//! - **WorkerLoop / WorkerPool**: consume → execute → record → ack
//! - **Scheduler**: periodic invocations ("beat")
//! - **IdempotencyGuard**: at-most-once side effects on top of at-least-once delivery
//! - **GcLoop**: periodic purge of expired records and claims
//! - **Runtime**: wires all of the above for one process

pub mod builder;
pub mod gc_loop;
pub mod idempotency;
pub mod producer;
pub mod runtime;
pub mod scheduler;
pub mod status;
pub mod worker_loop;
pub mod worker_pool;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::gc_loop::{GcHandle, GcLoop, Swept};
pub use self::idempotency::IdempotencyGuard;
pub use self::producer::{DEFAULT_QUEUE, Producer, Receipt};
pub use self::runtime::{Backends, Runtime, RuntimeOptions};
pub use self::scheduler::{ScheduleSpec, ScheduledEntry, Scheduler, SchedulerHandle};
pub use self::status::StatusReader;
pub use self::worker_loop::WorkerLoop;
pub use self::worker_pool::WorkerPool;
