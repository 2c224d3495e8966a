// src/graph/system.rs

//! The graph engine: resource store, task registry and pull-based evaluation.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::errors::GraphError;
use crate::graph::{Package, Resource, ResourceKey, ResourceKind, Task};

/// Capability handed to task actions for resolving their dependencies.
///
/// Only [`Fetch::fetch`] is required; the typed accessors fail with
/// [`GraphError::KindMismatch`] when the stored resource has another kind.
pub trait Fetch {
    fn fetch(&mut self, key: &ResourceKey) -> Result<Resource, GraphError>;

    fn int(&mut self, key: &ResourceKey) -> Result<i64, GraphError> {
        let resource = self.fetch(key)?;
        resource
            .as_int()
            .ok_or_else(|| kind_mismatch(key, ResourceKind::Int, &resource))
    }

    fn string(&mut self, key: &ResourceKey) -> Result<String, GraphError> {
        let resource = self.fetch(key)?;
        resource
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| kind_mismatch(key, ResourceKind::Str, &resource))
    }

    fn path(&mut self, key: &ResourceKey) -> Result<PathBuf, GraphError> {
        let resource = self.fetch(key)?;
        resource
            .as_path()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| kind_mismatch(key, ResourceKind::File, &resource))
    }

    fn package(&mut self, key: &ResourceKey) -> Result<Package, GraphError> {
        let resource = self.fetch(key)?;
        resource
            .as_package()
            .cloned()
            .ok_or_else(|| kind_mismatch(key, ResourceKind::Package, &resource))
    }

    fn task_result(&mut self, key: &ResourceKey) -> Result<String, GraphError> {
        let resource = self.fetch(key)?;
        resource
            .as_task_result()
            .map(str::to_string)
            .ok_or_else(|| kind_mismatch(key, ResourceKind::TaskResult, &resource))
    }
}

fn kind_mismatch(key: &ResourceKey, expected: ResourceKind, found: &Resource) -> GraphError {
    GraphError::KindMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Owner of the resource store and the task registry for one run.
///
/// Evaluation is synchronous and depth-first: a task's action calls
/// [`Fetch::fetch`], which either hits the store or builds the producing task
/// first. Every output is committed as soon as its task finishes, so a
/// resource needed along several paths is computed once.
///
/// Each level of a dependency chain costs a few native stack frames; the
/// stack is grown on demand, so chain depth is bounded by memory only.
///
/// A `System` must not be shared between concurrent builds.
#[derive(Default)]
pub struct System {
    resources: HashMap<ResourceKey, Resource>,
    tasks: BTreeMap<String, Task>,
    /// Which task produces each declared output.
    producers: HashMap<ResourceKey, String>,
    /// Tasks whose actions are currently on the stack, outermost first.
    building: Vec<String>,
    invocations: usize,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a system pre-seeded with leaf resources.
    pub fn with_resources<I>(resources: I) -> Self
    where
        I: IntoIterator<Item = (ResourceKey, Resource)>,
    {
        let mut system = Self::new();
        for (key, resource) in resources {
            system.seed(key, resource);
        }
        system
    }

    /// Store a leaf resource. Returns `false` (and keeps the old value) if the
    /// key is already present.
    pub fn seed(&mut self, key: ResourceKey, resource: Resource) -> bool {
        if self.resources.contains_key(&key) {
            return false;
        }
        self.resources.insert(key, resource);
        true
    }

    /// Register a task under `name`.
    pub fn register(&mut self, name: impl Into<String>, task: Task) -> Result<(), GraphError> {
        let name = name.into();

        if self.tasks.contains_key(&name) {
            return Err(GraphError::DuplicateTask(name));
        }
        if task.produces.is_empty() {
            return Err(GraphError::InvalidTask {
                task: name,
                reason: "a task must produce at least one resource".to_string(),
            });
        }
        for key in &task.produces {
            if let Some(existing) = self.producers.get(key) {
                return Err(GraphError::DuplicateProducer {
                    key: key.to_string(),
                    existing: existing.clone(),
                    task: name,
                });
            }
        }

        for key in &task.produces {
            self.producers.insert(key.clone(), name.clone());
        }
        debug!(task = %name, outputs = task.produces.len(), "registered task");
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Run the named task and commit its outputs to the store.
    ///
    /// Outputs whose keys are already present keep their stored value; the
    /// freshly produced resources are returned either way.
    pub fn build(&mut self, name: &str) -> Result<Vec<Resource>, GraphError> {
        let task = self
            .tasks
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::TaskNotFound(name.to_string()))?;

        debug!(task = %name, depth = self.building.len(), "building task");

        self.building.push(name.to_string());
        self.invocations += 1;
        let result = crate::on_growable_stack(|| (task.action)(self));
        self.building.pop();

        let resources = result.map_err(|source| GraphError::TaskFailed {
            task: name.to_string(),
            source,
        })?;

        if resources.len() != task.produces.len() {
            return Err(GraphError::OutputMismatch {
                task: name.to_string(),
                expected: task.produces.len(),
                got: resources.len(),
            });
        }

        for (key, resource) in task.produces.iter().zip(resources.iter()) {
            self.resources
                .entry(key.clone())
                .or_insert_with(|| resource.clone());
        }

        debug!(task = %name, "task built");
        Ok(resources)
    }

    pub fn resource(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Registered tasks in name order.
    pub fn tasks(&self) -> impl Iterator<Item = (&str, &Task)> {
        self.tasks.iter().map(|(name, task)| (name.as_str(), task))
    }

    /// Number of task actions executed so far.
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    fn cycle_error(&self, key: &ResourceKey, task: &str) -> Option<GraphError> {
        let start = self.building.iter().position(|t| t == task)?;
        let mut chain: Vec<&str> = self.building[start..].iter().map(String::as_str).collect();
        chain.push(task);
        Some(GraphError::CycleDetected {
            key: key.to_string(),
            chain: format!("{} (while resolving {key})", chain.join(" -> ")),
        })
    }
}

impl Fetch for System {
    fn fetch(&mut self, key: &ResourceKey) -> Result<Resource, GraphError> {
        if let Some(resource) = self.resources.get(key) {
            trace!(%key, "resource already built");
            return Ok(resource.clone());
        }

        let Some(task) = self.producers.get(key).cloned() else {
            return Err(GraphError::ResourceUnbuildable(key.to_string()));
        };

        if let Some(err) = self.cycle_error(key, &task) {
            return Err(err);
        }

        trace!(%key, task = %task, "resource missing; building producer");
        self.build(&task)?;

        self.resources
            .get(key)
            .cloned()
            .ok_or_else(|| GraphError::ResourceUnbuildable(key.to_string()))
    }
}
