// src/errors.rs

//! Crate-wide error types.
//!
//! - [`GraphError`] is returned by the resource/task graph engine.
//! - [`ActionError`] is returned by the idempotent action combinators.
//! - [`ContainerError`] covers container states reconciliation can't handle.
//! - [`MkError`] is what the config layer and the `mk` binary surface.
//!
//! Cache corruption has no variant: the cache layer logs it and
//! falls back to an empty cache.

use std::fmt;

use thiserror::Error;

use crate::container::{ContainerState, DesiredState};
use crate::graph::ResourceKind;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("task {0:?} was not found")]
    TaskNotFound(String),

    #[error("resource {0} is not built and no task produces it")]
    ResourceUnbuildable(String),

    #[error("cycle detected: {chain}")]
    CycleDetected { key: String, chain: String },

    #[error("resource {key} is {found}, expected {expected}")]
    KindMismatch {
        key: String,
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("task {task:?} declares {expected} outputs but produced {got}")]
    OutputMismatch {
        task: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid task {task:?}: {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("task {0:?} is already registered")]
    DuplicateTask(String),

    #[error("resource {key} is already produced by task {existing:?} (registering {task:?})")]
    DuplicateProducer {
        key: String,
        existing: String,
        task: String,
    },

    #[error("build {task:?}")]
    TaskFailed {
        task: String,
        #[source]
        source: anyhow::Error,
    },
}

impl GraphError {
    /// Name of the innermost task whose action failed, following nested
    /// `TaskFailed` wrappers.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            GraphError::TaskFailed { task, source } => match source.downcast_ref::<GraphError>() {
                Some(inner) => inner.failed_task().or(Some(task.as_str())),
                None => Some(task.as_str()),
            },
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("check is completed")]
    CheckFailed(#[source] anyhow::Error),

    #[error(transparent)]
    PerformFailed(anyhow::Error),

    #[error("action #{index}")]
    Step {
        index: usize,
        #[source]
        source: Box<ActionError>,
    },

    #[error(transparent)]
    Parallel(MultiError),

    #[error("action panicked: {0}")]
    Panicked(String),
}

/// Failures collected by [`crate::idempotent::parallel`], one entry per failed
/// action, ordered by action index.
#[derive(Debug, Default)]
pub struct MultiError {
    pub total: usize,
    pub failures: Vec<(usize, ActionError)>,
}

impl MultiError {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.failures.iter().map(|(i, _)| *i).collect()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} actions failed", self.failures.len(), self.total)?;
        for (index, err) in &self.failures {
            write!(f, "; action #{index}: {}", error_chain(err))?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Render an error and all of its sources on one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("container {container}: don't know how to reach {desired} from {state} state")]
    UnsupportedTransition {
        container: String,
        desired: DesiredState,
        state: ContainerState,
    },
}

#[derive(Error, Debug)]
pub enum MkError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MkError>;
