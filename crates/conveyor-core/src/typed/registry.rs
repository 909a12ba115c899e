//! TaskRegistry - name -> (handler, policy) dispatch table.
//!
//! Built once at process start and then shared read-only with the worker
//! pool, so lookups need no lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::context::TaskContext;
use super::handler::{DynHandler, FnHandler, Handler, TypedHandler};
use super::task::Task;
use crate::domain::{AckPolicy, HandlerError, RetryPolicy, TaskName, UnknownTaskError};

/// Execution policy attached to a registered task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPolicy {
    pub retry: RetryPolicy,
    pub ack_policy: AckPolicy,
}

impl TaskPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn ack_policy(mut self, ack_policy: AckPolicy) -> Self {
        self.ack_policy = ack_policy;
        self
    }
}

/// A resolved registry entry.
#[derive(Clone)]
pub struct RegisteredTask {
    handler: Arc<dyn DynHandler>,
    policy: TaskPolicy,
}

impl RegisteredTask {
    pub fn handler(&self) -> &Arc<dyn DynHandler> {
        &self.handler
    }

    pub fn policy(&self) -> &TaskPolicy {
        &self.policy
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task '{0}' is already registered")]
    AlreadyRegistered(TaskName),
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskName, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
        policy: TaskPolicy,
    ) -> Result<(), RegistryError> {
        self.register_dyn(
            TaskName::new(T::NAME),
            Arc::new(TypedHandler::<T, H>::new(handler)),
            policy,
        )
    }

    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<TaskName>,
        policy: TaskPolicy,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(TaskContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register_dyn(name.into(), Arc::new(FnHandler::new(f)), policy)
    }

    pub fn register_dyn(
        &mut self,
        name: TaskName,
        handler: Arc<dyn DynHandler>,
        policy: TaskPolicy,
    ) -> Result<(), RegistryError> {
        if self.tasks.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.tasks.insert(name, RegisteredTask { handler, policy });
        Ok(())
    }

    /// The single dispatch point used by workers.
    pub fn resolve(&self, name: &TaskName) -> Result<&RegisteredTask, UnknownTaskError> {
        self.tasks
            .get(name)
            .ok_or_else(|| UnknownTaskError(name.clone()))
    }

    /// Registered names, sorted.
    pub fn registered_names(&self) -> Vec<TaskName> {
        let mut names: Vec<TaskName> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ack policy per task, for producers colocated with this registry.
    pub fn ack_policies(&self) -> HashMap<TaskName, AckPolicy> {
        self.tasks
            .iter()
            .map(|(name, task)| (name.clone(), task.policy.ack_policy))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
