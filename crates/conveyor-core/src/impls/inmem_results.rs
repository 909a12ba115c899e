//! InMemoryResultStore - execution records behind a mutex, with optional
//! retention.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{StoreError, TaskExecutionRecord, TaskId, TaskState, Transition};
use crate::ports::{Clock, ResultStore, StateCounts};

struct Entry {
    record: TaskExecutionRecord,
    touched_at: Instant,
}

pub struct InMemoryResultStore {
    records: Mutex<HashMap<TaskId, Entry>>,
    /// Records untouched for longer than this are evicted. `None` keeps them.
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl InMemoryResultStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl: None,
            clock,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TaskId, Entry>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("result store poisoned".to_string()))
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.touched_at) >= ttl)
    }

    /// Records currently held, expired or not.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn apply(
        &self,
        task_id: TaskId,
        transition: Transition,
    ) -> Result<TaskExecutionRecord, StoreError> {
        let now = Instant::now();
        let wall = self.clock.now();
        let mut records = self.lock()?;

        if records
            .get(&task_id)
            .is_some_and(|entry| self.expired(entry, now))
        {
            records.remove(&task_id);
        }

        let entry = records.entry(task_id).or_insert_with(|| Entry {
            record: TaskExecutionRecord::pending(wall),
            touched_at: now,
        });
        entry
            .record
            .apply(transition, wall)
            .map_err(|source| StoreError::InvalidTransition { task_id, source })?;
        entry.touched_at = now;
        Ok(entry.record.clone())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskExecutionRecord>, StoreError> {
        let now = Instant::now();
        let mut records = self.lock()?;
        match records.get(&task_id) {
            Some(entry) if self.expired(entry, now) => {
                records.remove(&task_id);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.record.clone())),
            None => Ok(None),
        }
    }

    async fn counts_by_state(&self) -> Result<StateCounts, StoreError> {
        let now = Instant::now();
        let mut records = self.lock()?;
        records.retain(|_, entry| !self.expired(entry, now));

        let mut counts = StateCounts::default();
        for entry in records.values() {
            match entry.record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Started => counts.started += 1,
                TaskState::Retrying => counts.retrying += 1,
                TaskState::Success => counts.success += 1,
                TaskState::Failure => counts.failure += 1,
            }
        }
        Ok(counts)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let now = Instant::now();
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, entry| !self.expired(entry, now));
        Ok(before - records.len())
    }
}
