// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// `Mkfile.toml` exactly as deserialized, before validation.
///
/// ```toml
/// [config]
/// cache_file = ".mk/cache.json"
/// shell = "sh"
///
/// [task.compile]
/// cmd = "cc -o app main.c"
/// needs = ["generate"]
/// sources = ["src/**/*.c"]
/// creates = "app"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMkfile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated `Mkfile.toml`. Only obtainable through `TryFrom<RawMkfile>`
/// or [`Mkfile::new_unchecked`].
#[derive(Debug, Clone)]
pub struct Mkfile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl Mkfile {
    /// Build a `Mkfile` without running validation. Used after validation
    /// and by test builders that assemble known-good files.
    pub fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { config, task }
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.task.keys().map(String::as_str)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Where shell-task fingerprints are persisted, relative to the
    /// directory holding the Mkfile.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Shell used as `<shell> -c <cmd>`.
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(".mk/cache.json")
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            shell: default_shell(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default)]
    pub description: Option<String>,

    pub cmd: String,

    /// Tasks whose results this one pulls before running.
    #[serde(default)]
    pub needs: Vec<String>,

    /// Glob patterns of input files. Their combined fingerprint decides
    /// whether the command has to run again.
    #[serde(default)]
    pub sources: Vec<String>,

    /// File the command produces. Missing means the task is not done.
    #[serde(default)]
    pub creates: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
