//! ResultStore port - execution records addressable by task id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{StoreError, TaskExecutionRecord, TaskId, Transition};

/// Number of records in each state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub started: usize,
    pub retrying: usize,
    pub success: usize,
    pub failure: usize,
}

/// Shared store of execution records.
///
/// Every mutation is a single atomic call: the store validates `transition`
/// against the current record and applies it under its own lock (or the
/// backend's compare-and-set). Callers never read, modify and write back.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Apply `transition` to the record of `task_id`, creating a `Pending`
    /// record first if none exists. Returns the updated record.
    async fn apply(
        &self,
        task_id: TaskId,
        transition: Transition,
    ) -> Result<TaskExecutionRecord, StoreError>;

    /// `None` if the id was never recorded or has been evicted.
    async fn get(&self, task_id: TaskId) -> Result<Option<TaskExecutionRecord>, StoreError>;

    async fn counts_by_state(&self) -> Result<StateCounts, StoreError>;

    /// Drop every record past its retention and return how many went.
    ///
    /// Backends that expire keys themselves keep the default no-op.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
