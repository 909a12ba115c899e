//! Broker port - ordered transport of task invocations.
//!
//! The broker knows nothing about task semantics. It keeps one FIFO mailbox
//! per queue name, supports delayed publication for retries, and honours the
//! invocation's ack policy.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{TaskInvocation, TransportError};

/// An invocation handed to a worker.
///
/// With `AckPolicy::Late` the broker keeps the message until `ack` is called.
/// Dropping the delivery without acking (worker crash, failed bookkeeping)
/// returns the message to the front of its queue, flagged as redelivered.
/// With `AckPolicy::Eager` the message is already gone and `ack` is a no-op.
#[async_trait]
pub trait Delivery: Send {
    fn invocation(&self) -> &TaskInvocation;

    /// Has this invocation been handed out before?
    fn redelivered(&self) -> bool;

    async fn ack(self: Box<Self>) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Append an invocation to `queue`. Either the whole message is enqueued
    /// or an error is returned.
    async fn publish(&self, queue: &str, invocation: TaskInvocation) -> Result<(), TransportError>;

    /// Make `invocation` visible on `queue` once `delay` has elapsed.
    async fn publish_after(
        &self,
        queue: &str,
        invocation: TaskInvocation,
        delay: Duration,
    ) -> Result<(), TransportError>;

    /// Wait, without polling, until an invocation is available on `queue`.
    ///
    /// Returns `TransportError::Closed` once the broker shuts down.
    async fn consume(&self, queue: &str) -> Result<Box<dyn Delivery>, TransportError>;

    /// Messages on `queue` that are not finished with: ready, delayed, or
    /// handed out and not yet acked. Zero means every eager delivery has been
    /// taken and every late one acked.
    async fn outstanding(&self, queue: &str) -> Result<usize, TransportError>;
}
