//! AppBuilder - registers tasks and validates the wiring at startup.
//!
//! Producers and workers may be deployed separately, so a worker that forgot
//! to register a task would only notice when the first invocation fails.
//! `expect_tasks` + `build` turn that into a startup error.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::HandlerError;
use crate::typed::{Handler, RegistryError, Task, TaskContext, TaskPolicy, TaskRegistry};

/// ```ignore
/// let app = AppBuilder::new()
///     .register::<LongRunning, _>(LongRunningHandler::default(), TaskPolicy::new())?
///     .expect_tasks(&["long_running_task"])
///     .build()?;
/// ```
pub struct AppBuilder {
    registry: TaskRegistry,
    expected_tasks: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing tasks: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            expected_tasks: None,
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
        policy: TaskPolicy,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler, policy)?;
        Ok(self)
    }

    pub fn register_fn<F, Fut>(
        mut self,
        name: &str,
        policy: TaskPolicy,
        f: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn(TaskContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.registry.register_fn(name, policy, f)?;
        Ok(self)
    }

    /// Task names that must be registered by the time `build` is called.
    pub fn expect_tasks(mut self, task_names: &[&str]) -> Self {
        self.expected_tasks = Some(task_names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered: Vec<String> = self
                .registry
                .registered_names()
                .into_iter()
                .map(|name| name.as_str().to_string())
                .collect();
            let missing: Vec<String> = expected_tasks
                .iter()
                .filter(|name| !registered.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }
        Ok(App {
            registry: Arc::new(self.registry),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated, immutable task registry ready to be shared with workers.
#[derive(Clone)]
pub struct App {
    registry: Arc<TaskRegistry>,
}

impl App {
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }
}
