#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use mk::config::{ConfigSection, Mkfile, RawMkfile, TaskConfig};

/// Builder for `Mkfile` to simplify test setup.
pub struct MkfileBuilder {
    raw: RawMkfile,
}

impl MkfileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawMkfile {
                config: ConfigSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.raw.task.insert(name.to_string(), task);
        self
    }

    pub fn cache_file(mut self, path: impl AsRef<Path>) -> Self {
        self.raw.config.cache_file = path.as_ref().to_path_buf();
        self
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.raw.config.shell = shell.to_string();
        self
    }

    /// The unvalidated file, for exercising validation errors.
    pub fn build_raw(self) -> RawMkfile {
        self.raw
    }

    pub fn build(self) -> Mkfile {
        Mkfile::try_from(self.raw).expect("Failed to build valid Mkfile from builder")
    }
}

impl Default for MkfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                ..TaskConfig::default()
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.task.description = Some(text.to_string());
        self
    }

    pub fn needs(mut self, dep: &str) -> Self {
        self.task.needs.push(dep.to_string());
        self
    }

    pub fn source(mut self, pattern: &str) -> Self {
        self.task.sources.push(pattern.to_string());
        self
    }

    pub fn creates(mut self, path: &str) -> Self {
        self.task.creates = Some(path.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
