//! Errors and their classification.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{InvalidTransition, TaskId, TaskName};

/// Classification of a handler failure.
///
/// Whether a kind is retried is decided by the task's `RetryPolicy`, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Temporary condition (network blip, rate limit, ...).
    Transient,
    /// Retrying cannot help.
    Permanent,
    /// Arguments did not decode into the task's typed input.
    InvalidArguments,
    /// No handler registered under the invocation's name.
    UnknownTask,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::UnknownTask => "unknown_task",
        };
        f.write_str(s)
    }
}

/// Failure returned by a task handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    kind: ErrorKind,
    message: String,
}

impl HandlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArguments, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<UnknownTaskError> for HandlerError {
    fn from(err: UnknownTaskError) -> Self {
        Self::new(ErrorKind::UnknownTask, err.to_string())
    }
}

/// The broker could not be reached or refused the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker is closed")]
    Closed,
}

/// Result store or claim store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("task {task_id}: {source}")]
    InvalidTransition {
        task_id: TaskId,
        #[source]
        source: InvalidTransition,
    },

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// The task name has no registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task '{0}'")]
pub struct UnknownTaskError(pub TaskName);
