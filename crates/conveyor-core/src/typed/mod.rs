//! Typed - task definitions and the dispatch table.
//!
//! # Two layers
//! - **Typed**: `Task` trait, `Handler<T>` trait. Argument decoding is checked
//!   against the task's type.
//! - **Dyn**: `DynHandler` trait, object-safe, what the registry stores.

pub mod context;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::context::TaskContext;
pub use self::handler::{DynHandler, FnHandler, Handler, TypedHandler};
pub use self::registry::{RegisteredTask, RegistryError, TaskPolicy, TaskRegistry};
pub use self::task::Task;
