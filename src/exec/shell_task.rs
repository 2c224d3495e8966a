// src/exec/shell_task.rs

//! A Mkfile task as an idempotent action.
//!
//! A shell task is considered done when:
//! - its `creates` file exists (if declared), and
//! - its `sources` fingerprint equals the one recorded after the last
//!   successful run (if sources are declared).
//!
//! A task with neither `creates` nor `sources` always runs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::cache::{collect_sources, fingerprint_paths, Cache};
use crate::config::TaskConfig;
use crate::exec::command::{run_shell, CommandOutput};
use crate::idempotent::{Action, ActionFuture, Context};

/// Source fingerprints keyed by task name, shared by all tasks of a run.
pub type Fingerprints = Arc<Mutex<Cache<String, String>>>;

pub fn lock_fingerprints(fingerprints: &Fingerprints) -> MutexGuard<'_, Cache<String, String>> {
    fingerprints.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct ShellTask {
    name: String,
    cmd: String,
    shell: String,
    root: PathBuf,
    env: BTreeMap<String, String>,
    sources: Vec<String>,
    creates: Option<PathBuf>,
    fingerprints: Fingerprints,
}

impl ShellTask {
    pub fn new(
        name: impl Into<String>,
        task: &TaskConfig,
        shell: impl Into<String>,
        root: impl Into<PathBuf>,
        fingerprints: Fingerprints,
    ) -> Self {
        Self {
            name: name.into(),
            cmd: task.cmd.clone(),
            shell: shell.into(),
            root: root.into(),
            env: task.env.clone(),
            sources: task.sources.clone(),
            creates: task.creates.clone(),
            fingerprints,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the declared output file, if any.
    pub fn creates_path(&self) -> Option<PathBuf> {
        self.creates.as_ref().map(|c| self.root.join(c))
    }

    fn current_fingerprint(&self) -> Result<String> {
        let files = collect_sources(&self.root, &self.sources)?;
        debug!(task = %self.name, files = files.len(), "collected sources");
        fingerprint_paths(&self.root, &files)
    }

    fn output_exists(&self) -> bool {
        self.creates_path().is_none_or(|p| p.exists())
    }
}

impl Action for ShellTask {
    type Output = CommandOutput;

    fn name(&self) -> String {
        format!("task {}", self.name)
    }

    fn is_completed(&self) -> ActionFuture<'_, bool> {
        Box::pin(async move {
            if !self.output_exists() {
                return Ok(false);
            }
            if self.sources.is_empty() {
                return Ok(self.creates.is_some());
            }

            let current = self.current_fingerprint()?;
            let recorded = lock_fingerprints(&self.fingerprints).get(&self.name).cloned();
            Ok(recorded.as_deref() == Some(current.as_str()))
        })
    }

    fn perform<'a>(&'a self, ctx: &'a Context) -> ActionFuture<'a, CommandOutput> {
        Box::pin(async move {
            info!(task = %self.name, cmd = %self.cmd, "running task");
            let output = run_shell(ctx, &self.shell, &self.cmd, &self.root, &self.env).await?;

            for line in output.stdout.lines() {
                info!(task = %self.name, "{}", line);
            }
            if !output.success() {
                bail!(
                    "command {:?} exited with code {}: {}",
                    self.cmd,
                    output.code,
                    output.stderr.trim()
                );
            }
            if let Some(path) = self.creates_path() {
                if !path.exists() {
                    bail!("command {:?} did not create {:?}", self.cmd, path);
                }
            }

            if !self.sources.is_empty() {
                let fingerprint = self.current_fingerprint()?;
                let changed =
                    lock_fingerprints(&self.fingerprints).compare_and_swap(self.name.clone(), fingerprint);
                debug!(task = %self.name, changed, "recorded source fingerprint");
            }

            Ok(output)
        })
    }
}
