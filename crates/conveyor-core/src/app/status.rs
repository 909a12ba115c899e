//! Status - read-only queries against the result store.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{StoreError, TaskExecutionRecord, TaskId};
use crate::ports::{Clock, ResultStore, StateCounts};

/// Looks up execution records by task id.
///
/// Reads never block on the task: they report whatever the store holds now.
/// An id that was never recorded (still queued, unknown, or evicted after its
/// retention window) reads as `Pending`.
///
/// ```ignore
/// let status = StatusReader::new(results, clock);
/// let record = tokio::time::timeout(
///     Duration::from_secs(30),
///     status.wait_for_terminal(receipt.task_id, Duration::from_millis(200)),
/// )
/// .await??;
/// match record.state {
///     TaskState::Success => println!("{:?}", record.result),
///     _ => eprintln!("failed after {} attempts: {:?}", record.attempt_count, record.error),
/// }
/// ```
#[derive(Clone)]
pub struct StatusReader {
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
}

impl StatusReader {
    pub fn new(store: Arc<dyn ResultStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskExecutionRecord, StoreError> {
        Ok(self
            .store
            .get(task_id)
            .await?
            .unwrap_or_else(|| TaskExecutionRecord::pending(self.clock.now())))
    }

    pub async fn counts(&self) -> Result<StateCounts, StoreError> {
        self.store.counts_by_state().await
    }

    /// Poll until the record is terminal.
    ///
    /// Convenience for callers that want to block on a result (CLI `--wait`,
    /// tests). Never returns for a task that stays queued forever; wrap in
    /// `tokio::time::timeout` when that matters.
    pub async fn wait_for_terminal(
        &self,
        task_id: TaskId,
        poll_interval: Duration,
    ) -> Result<TaskExecutionRecord, StoreError> {
        loop {
            let record = self.get_status(task_id).await?;
            if record.state.is_terminal() {
                return Ok(record);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
