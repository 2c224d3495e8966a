// src/graph/task.rs

//! Task definitions registered in a [`crate::graph::System`].

use std::fmt;
use std::sync::Arc;

use crate::graph::{Fetch, Resource, ResourceKey};

/// The body of a task.
///
/// It receives the fetch capability of the system it runs in and returns one
/// resource per declared output, in the same order.
pub type TaskAction =
    Arc<dyn Fn(&mut dyn Fetch) -> anyhow::Result<Vec<Resource>> + Send + Sync>;

/// A named unit of work producing one or more resources.
#[derive(Clone)]
pub struct Task {
    pub description: Option<String>,
    pub produces: Vec<ResourceKey>,
    pub action: TaskAction,
}

impl Task {
    pub fn new<F>(produces: Vec<ResourceKey>, action: F) -> Self
    where
        F: Fn(&mut dyn Fetch) -> anyhow::Result<Vec<Resource>> + Send + Sync + 'static,
    {
        Self {
            description: None,
            produces,
            action: Arc::new(action),
        }
    }

    /// Single-output convenience constructor: the closure returns the one
    /// resource stored at `key`.
    pub fn single<F>(key: ResourceKey, action: F) -> Self
    where
        F: Fn(&mut dyn Fetch) -> anyhow::Result<Resource> + Send + Sync + 'static,
    {
        Self::new(vec![key], move |fetch| Ok(vec![action(fetch)?]))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("description", &self.description)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}
