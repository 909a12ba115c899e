use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::worker_loop::WorkerLoop;

/// A fixed number of `WorkerLoop`s consuming the same queue.
///
/// - `request_shutdown()` stops every worker from taking new deliveries.
/// - `shutdown_and_join()` also waits for in-flight tasks to finish.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers cloned from `worker`, numbered `0..n`.
    pub fn spawn(n: usize, worker: WorkerLoop) -> Self {
        info!(count = n, "starting worker pool");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let worker = worker.clone().with_id(worker_id);
                tokio::spawn(worker.run(shutdown_rx.clone()))
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    pub fn request_shutdown(&self) {
        // Receivers may already be gone if every worker exited on broker close.
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        info!("stopping worker pool");
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AckPolicy, HandlerError, TaskId, TaskInvocation, TaskName, TaskState,
    };
    use crate::impls::{InMemoryBroker, InMemoryResultStore};
    use crate::ports::{Broker, ResultStore, SystemClock};
    use crate::typed::{TaskPolicy, TaskRegistry};
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use ulid::Ulid;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_drains_queue_concurrently() {
        let mut registry = TaskRegistry::new();
        registry
            .register_fn("sleepy", TaskPolicy::new(), |_ctx, args| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, HandlerError>(args.into_iter().next().unwrap_or(Value::Null))
            })
            .unwrap();

        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryResultStore::new(Arc::new(SystemClock)));
        let worker = WorkerLoop::new("default", broker.clone(), store.clone(), Arc::new(registry));

        let mut ids = Vec::new();
        for i in 0..8 {
            let inv = TaskInvocation::new(
                TaskId::from_ulid(Ulid::new()),
                TaskName::new("sleepy"),
                vec![json!(i)],
                Utc::now(),
                AckPolicy::Late,
            );
            ids.push(inv.task_id());
            broker.publish("default", inv).await.unwrap();
        }

        let pool = WorkerPool::spawn(4, worker);
        assert_eq!(pool.size(), 4);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.counts_by_state().await.unwrap().success == ids.len() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        pool.shutdown_and_join().await;
        for (i, id) in ids.into_iter().enumerate() {
            let record = store.get(id).await.unwrap().unwrap();
            assert_eq!(record.state, TaskState::Success);
            assert_eq!(record.result, Some(json!(i)));
        }
        assert_eq!(broker.in_flight().unwrap(), 0);
    }
}
