// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{Mkfile, RawMkfile};
use crate::errors::{MkError, Result};

impl TryFrom<RawMkfile> for Mkfile {
    type Error = MkError;

    fn try_from(raw: RawMkfile) -> std::result::Result<Self, Self::Error> {
        validate_raw(&raw)?;
        Ok(Mkfile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw(cfg: &RawMkfile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_fields(cfg)?;
    validate_task_needs(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawMkfile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(MkError::ConfigError(
            "Mkfile must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawMkfile) -> Result<()> {
    if cfg.config.shell.trim().is_empty() {
        return Err(MkError::ConfigError(
            "[config].shell must not be empty".to_string(),
        ));
    }
    if cfg.config.cache_file.as_os_str().is_empty() {
        return Err(MkError::ConfigError(
            "[config].cache_file must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_fields(cfg: &RawMkfile) -> Result<()> {
    for (name, task) in &cfg.task {
        if task.cmd.trim().is_empty() {
            return Err(MkError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                name
            )));
        }
        if let Some(creates) = &task.creates {
            if creates.as_os_str().is_empty() {
                return Err(MkError::ConfigError(format!(
                    "task '{}' has an empty `creates`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_needs(cfg: &RawMkfile) -> Result<()> {
    for (name, task) in &cfg.task {
        for dep in &task.needs {
            if dep == name {
                return Err(MkError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `needs`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(MkError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `needs`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawMkfile) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in &cfg.task {
        for dep in &task.needs {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(MkError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}
