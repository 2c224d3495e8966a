// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Mkfile, RawMkfile};
use crate::errors::Result;

/// Read and deserialize a `Mkfile.toml` without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawMkfile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawMkfile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Parse and validate TOML text.
pub fn load_from_str(contents: &str) -> Result<Mkfile> {
    let raw: RawMkfile = toml::from_str(contents)?;
    Mkfile::try_from(raw)
}

/// Load a `Mkfile.toml` and validate it.
///
/// Validation rejects files with no tasks, empty commands, unknown or
/// self-referencing `needs` entries and dependency cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Mkfile> {
    let raw = load_from_path(path)?;
    Mkfile::try_from(raw)
}

/// `Mkfile.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Mkfile.toml")
}
