//! Domain model (ids, invocations, execution records, retry policy, errors).
//!
//! Nothing here touches a queue, a store or a clock; time is passed in.

pub mod claim;
pub mod decision;
pub mod errors;
pub mod ids;
pub mod record;
pub mod retry;
pub mod state;
pub mod task;

pub use claim::IdempotencyClaim;
pub use decision::{Decision, decide};
pub use errors::{ErrorKind, HandlerError, StoreError, TransportError, UnknownTaskError};
pub use ids::{ParseTaskIdError, TaskId};
pub use record::{InvalidTransition, TaskExecutionRecord, Transition};
pub use retry::{Backoff, RetryPolicy};
pub use state::TaskState;
pub use task::{AckPolicy, TaskInvocation, TaskName};
