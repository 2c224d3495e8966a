// src/exec/plan.rs

//! Registering Mkfile tasks in a graph [`System`].
//!
//! Each task `name` produces `task(name)` as a [`Resource::TaskResult`] and,
//! when it declares `creates`, also `file(<creates>)` as a
//! [`Resource::File`]. Its action first fetches `task(dep)` for every entry
//! in `needs`, so dependencies run on demand and at most once per run, then
//! performs the task's [`ShellTask`] action.
//!
//! Graph actions are synchronous. The idempotent action is driven with
//! [`Handle::block_on`], so a build must run on a blocking thread (e.g.
//! inside [`tokio::task::spawn_blocking`]).

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use crate::config::Mkfile;
use crate::errors::GraphError;
use crate::exec::shell_task::{Fingerprints, ShellTask};
use crate::graph::{Fetch, Resource, ResourceKey, System, Task};
use crate::idempotent::{self, Context, Outcome};

/// Everything a shell-task graph action needs from the surrounding run.
#[derive(Clone)]
pub struct PlanEnv {
    pub handle: Handle,
    pub ctx: Context,
    pub fingerprints: Fingerprints,
}

/// Build a [`System`] containing one graph task per Mkfile task.
///
/// `root` is the directory commands run in and relative paths resolve
/// against (normally the Mkfile's directory).
pub fn build_system(mkfile: &Mkfile, root: &Path, env: PlanEnv) -> Result<System, GraphError> {
    let mut system = System::new();

    for (name, cfg) in &mkfile.task {
        let action = Arc::new(ShellTask::new(
            name.clone(),
            cfg,
            mkfile.config.shell.clone(),
            root,
            env.fingerprints.clone(),
        ));

        let mut produces = vec![ResourceKey::task(name.clone())];
        if let Some(creates) = &cfg.creates {
            produces.push(ResourceKey::file(creates.to_string_lossy()));
        }

        let needs = cfg.needs.clone();
        let env = env.clone();
        let task_name = name.clone();
        let mut task = Task::new(produces, move |fetch: &mut dyn Fetch| {
            for dep in &needs {
                fetch.task_result(&ResourceKey::task(dep.clone()))?;
            }

            let outcome = env
                .handle
                .block_on(idempotent::perform(&env.ctx, action.as_ref()))?;
            match outcome {
                Outcome::AlreadyDone => info!(task = %task_name, "up to date"),
                Outcome::Performed(out) => {
                    info!(task = %task_name, exit_code = out.code, "task finished")
                }
            }

            let mut resources = vec![Resource::TaskResult(task_name.clone())];
            if let Some(path) = action.creates_path() {
                resources.push(Resource::File(path));
            }
            Ok(resources)
        });
        if let Some(description) = &cfg.description {
            task = task.with_description(description.clone());
        }

        system.register(name.clone(), task)?;
    }

    Ok(system)
}

/// Resolve `targets` in order against `system`, building whatever they pull.
///
/// Returns the names of the targets resolved. Stops at the first failure.
pub fn run_targets(system: &mut System, targets: &[String]) -> Result<Vec<String>, GraphError> {
    let mut done = Vec::with_capacity(targets.len());
    for target in targets {
        if system.task(target).is_none() {
            return Err(GraphError::TaskNotFound(target.clone()));
        }
        let name = system.task_result(&ResourceKey::task(target.clone()))?;
        done.push(name);
    }
    Ok(done)
}
