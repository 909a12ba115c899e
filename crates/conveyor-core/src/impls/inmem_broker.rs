//! InMemoryBroker - in-process broker for development, tests and the
//! colocated runtime.
//!
//! - One `VecDeque` per queue name, FIFO.
//! - Delayed messages wait in a min-heap until due, then join their queue.
//! - Late-ack deliveries stay in `unacked` until acked; dropping an unacked
//!   delivery puts the message back at the front of its queue.
//! - Consumers sleep on a `Notify` (or until the next delayed message is due),
//!   never spin.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{AckPolicy, TaskInvocation, TransportError};
use crate::ports::{Broker, Delivery};

#[derive(Debug, Clone)]
struct Message {
    invocation: TaskInvocation,
    redelivered: bool,
}

/// Delayed message. Reverse ordering so `BinaryHeap` pops the earliest first;
/// `seq` keeps publication order among equal due times.
#[derive(Debug)]
struct ScheduledMessage {
    due: Instant,
    seq: u64,
    queue: String,
    invocation: TaskInvocation,
}

impl PartialEq for ScheduledMessage {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledMessage {}

impl PartialOrd for ScheduledMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Message>>,
    unacked: HashMap<u64, (String, Message)>,
    scheduled: BinaryHeap<ScheduledMessage>,
    next_tag: u64,
    next_seq: u64,
    closed: bool,
}

impl BrokerState {
    /// Move delayed messages whose time has come onto their queues.
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.due > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            self.queues
                .entry(entry.queue)
                .or_default()
                .push_back(Message {
                    invocation: entry.invocation,
                    redelivered: false,
                });
        }
    }
}

struct Shared {
    state: Mutex<BrokerState>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::Unavailable("broker state poisoned".to_string()))
    }
}

pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Stop accepting and handing out messages. Blocked consumers wake up with
    /// `TransportError::Closed`.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.lock() {
            state.closed = true;
        }
        self.shared.notify.notify_waiters();
    }

    /// Messages ready for delivery on `queue`.
    pub fn depth(&self, queue: &str) -> Result<usize, TransportError> {
        let state = self.shared.lock()?;
        Ok(state.queues.get(queue).map_or(0, VecDeque::len))
    }

    /// Late-ack deliveries handed out but not yet acknowledged.
    pub fn in_flight(&self) -> Result<usize, TransportError> {
        Ok(self.shared.lock()?.unacked.len())
    }

    /// Messages waiting for their delay to elapse.
    pub fn delayed(&self) -> Result<usize, TransportError> {
        Ok(self.shared.lock()?.scheduled.len())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, queue: &str, invocation: TaskInvocation) -> Result<(), TransportError> {
        {
            let mut state = self.shared.lock()?;
            if state.closed {
                return Err(TransportError::Closed);
            }
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(Message {
                    invocation,
                    redelivered: false,
                });
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn publish_after(
        &self,
        queue: &str,
        invocation: TaskInvocation,
        delay: Duration,
    ) -> Result<(), TransportError> {
        if delay.is_zero() {
            return self.publish(queue, invocation).await;
        }
        {
            let mut state = self.shared.lock()?;
            if state.closed {
                return Err(TransportError::Closed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.scheduled.push(ScheduledMessage {
                due: Instant::now() + delay,
                seq,
                queue: queue.to_string(),
                invocation,
            });
        }
        // Waiters recompute their wake-up time.
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn outstanding(&self, queue: &str) -> Result<usize, TransportError> {
        let state = self.shared.lock()?;
        let ready = state.queues.get(queue).map_or(0, VecDeque::len);
        let delayed = state.scheduled.iter().filter(|m| m.queue == queue).count();
        let unacked = state.unacked.values().filter(|(q, _)| q == queue).count();
        Ok(ready + delayed + unacked)
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn Delivery>, TransportError> {
        loop {
            // Register interest before inspecting the queues so a publish that
            // lands in between still wakes us.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut state = self.shared.lock()?;
                if state.closed {
                    return Err(TransportError::Closed);
                }
                state.promote_due(Instant::now());

                let message = state.queues.get_mut(queue).and_then(VecDeque::pop_front);
                if let Some(message) = message {
                    let tag = match message.invocation.ack_policy() {
                        AckPolicy::Late => {
                            let tag = state.next_tag;
                            state.next_tag += 1;
                            state
                                .unacked
                                .insert(tag, (queue.to_string(), message.clone()));
                            Some(tag)
                        }
                        AckPolicy::Eager => None,
                    };
                    return Ok(Box::new(InMemoryDelivery {
                        shared: Arc::clone(&self.shared),
                        message,
                        tag,
                    }));
                }

                state.scheduled.peek().map(|entry| entry.due)
            };

            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

struct InMemoryDelivery {
    shared: Arc<Shared>,
    message: Message,
    /// `Some` while a late-ack delivery is outstanding.
    tag: Option<u64>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn invocation(&self) -> &TaskInvocation {
        &self.message.invocation
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(mut self: Box<Self>) -> Result<(), TransportError> {
        if let Some(tag) = self.tag.take() {
            self.shared.lock()?.unacked.remove(&tag);
        }
        Ok(())
    }
}

impl Drop for InMemoryDelivery {
    fn drop(&mut self) {
        let Some(tag) = self.tag.take() else {
            return;
        };
        if let Ok(mut state) = self.shared.lock()
            && let Some((queue, mut message)) = state.unacked.remove(&tag)
        {
            debug!(task_id = %message.invocation.task_id(), "unacked delivery returned to queue");
            message.redelivered = true;
            state.queues.entry(queue).or_default().push_front(message);
        }
        self.shared.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskName};
    use chrono::Utc;
    use serde_json::json;
    use ulid::Ulid;

    fn invocation(name: &str, ack_policy: AckPolicy) -> TaskInvocation {
        TaskInvocation::new(
            TaskId::from_ulid(Ulid::new()),
            TaskName::new(name),
            vec![json!(name)],
            Utc::now(),
            ack_policy,
        )
    }

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let broker = InMemoryBroker::new();
        let first = invocation("a", AckPolicy::Eager);
        let second = invocation("b", AckPolicy::Eager);
        broker.publish("default", first.clone()).await.unwrap();
        broker.publish("default", second.clone()).await.unwrap();

        let d1 = broker.consume("default").await.unwrap();
        let d2 = broker.consume("default").await.unwrap();
        assert_eq!(d1.invocation(), &first);
        assert_eq!(d2.invocation(), &second);
    }

    #[tokio::test]
    async fn queues_are_isolated() {
        let broker = InMemoryBroker::new();
        broker.publish("q1", invocation("a", AckPolicy::Eager)).await.unwrap();
        assert_eq!(broker.depth("q1").unwrap(), 1);
        assert_eq!(broker.depth("q2").unwrap(), 0);

        let waiting = tokio::time::timeout(Duration::from_millis(50), broker.consume("q2")).await;
        assert!(waiting.is_err());
    }

    #[tokio::test]
    async fn late_ack_redelivers_when_dropped() {
        let broker = InMemoryBroker::new();
        let inv = invocation("a", AckPolicy::Late);
        broker.publish("default", inv.clone()).await.unwrap();

        let delivery = broker.consume("default").await.unwrap();
        assert!(!delivery.redelivered());
        assert_eq!(broker.in_flight().unwrap(), 1);
        drop(delivery);

        assert_eq!(broker.in_flight().unwrap(), 0);
        let again = broker.consume("default").await.unwrap();
        assert!(again.redelivered());
        assert_eq!(again.invocation(), &inv);

        again.ack().await.unwrap();
        assert_eq!(broker.in_flight().unwrap(), 0);
        assert_eq!(broker.depth("default").unwrap(), 0);
    }

    #[tokio::test]
    async fn eager_delivery_is_gone_once_received() {
        let broker = InMemoryBroker::new();
        broker
            .publish("default", invocation("a", AckPolicy::Eager))
            .await
            .unwrap();

        let delivery = broker.consume("default").await.unwrap();
        assert_eq!(broker.in_flight().unwrap(), 0);
        drop(delivery);
        assert_eq!(broker.depth("default").unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_publication_becomes_visible_after_delay() {
        let broker = InMemoryBroker::new();
        let start = Instant::now();
        broker
            .publish_after("default", invocation("a", AckPolicy::Eager), Duration::from_secs(4))
            .await
            .unwrap();
        assert_eq!(broker.delayed().unwrap(), 1);
        assert_eq!(broker.depth("default").unwrap(), 0);

        let delivery = broker.consume("default").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert_eq!(delivery.invocation().task_name().as_str(), "a");
        assert_eq!(broker.delayed().unwrap(), 0);
    }

    #[tokio::test]
    async fn publish_wakes_blocked_consumer() {
        let broker = Arc::new(InMemoryBroker::new());
        let consumer = tokio::spawn({
            let broker = Arc::clone(&broker);
            async move {
                broker
                    .consume("default")
                    .await
                    .map(|d| d.invocation().task_name().clone())
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker
            .publish("default", invocation("wake", AckPolicy::Eager))
            .await
            .unwrap();

        let name = consumer.await.unwrap().unwrap();
        assert_eq!(name.as_str(), "wake");
    }

    #[tokio::test]
    async fn outstanding_counts_until_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("default", invocation("a", AckPolicy::Late)).await.unwrap();
        broker
            .publish_after("default", invocation("b", AckPolicy::Late), Duration::from_secs(60))
            .await
            .unwrap();
        broker.publish("other", invocation("c", AckPolicy::Late)).await.unwrap();
        assert_eq!(broker.outstanding("default").await.unwrap(), 2);

        let delivery = broker.consume("default").await.unwrap();
        assert_eq!(broker.outstanding("default").await.unwrap(), 2);
        delivery.ack().await.unwrap();
        assert_eq!(broker.outstanding("default").await.unwrap(), 1);
        assert_eq!(broker.outstanding("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_broker_rejects_everything() {
        let broker = Arc::new(InMemoryBroker::new());
        let consumer = tokio::spawn({
            let broker = Arc::clone(&broker);
            async move { broker.consume("default").await.err() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        broker.close();
        assert_eq!(consumer.await.unwrap(), Some(TransportError::Closed));

        let err = broker
            .publish("default", invocation("a", AckPolicy::Late))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Closed);
        assert_eq!(broker.depth("default").unwrap(), 0);
    }
}
