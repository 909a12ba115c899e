//! conveyor-core
//!
//! Background task execution: producers enqueue named invocations on a
//! broker, a pool of workers executes them with at-least-once delivery and
//! retries, and execution records are kept in a result store for polling.
//!
//! # Modules
//! - **domain**: ids, invocations, execution records, retry policy, errors
//! - **ports**: broker, result store, claim store, clock, id generation
//! - **impls**: in-memory implementations of the ports
//! - **typed**: `Task` / `Handler` API and the task registry
//! - **app**: producer, status, worker pool, scheduler, runtime wiring
//! - **config**: TOML settings
//! - **demo**: a small set of example tasks

pub mod app;
pub mod config;
pub mod demo;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{App, AppBuilder, Backends, Producer, Receipt, Runtime, RuntimeOptions, StatusReader};
pub use config::{ConfigError, Settings};
pub use domain::{
    AckPolicy, ErrorKind, HandlerError, RetryPolicy, TaskExecutionRecord, TaskId, TaskName,
    TaskState,
};
pub use error::ConveyorError;
pub use typed::{Handler, Task, TaskContext, TaskPolicy};
