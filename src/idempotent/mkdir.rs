// src/idempotent/mkdir.rs

//! Ensure a local directory exists with the given permissions.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use tokio::fs;
use tracing::info;

use crate::idempotent::{Action, ActionFuture, Context};

pub const DEFAULT_DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
pub struct MkdirOptions {
    pub dir: PathBuf,
    /// Permission bits; [`DEFAULT_DIR_MODE`] when `None`.
    pub mode: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Mkdir {
    dir: PathBuf,
    mode: u32,
}

impl Mkdir {
    pub fn new(opts: MkdirOptions) -> Self {
        Self {
            dir: opts.dir,
            mode: opts.mode.unwrap_or(DEFAULT_DIR_MODE),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

enum Inspection {
    Missing,
    NotADirectory,
    Directory { mode_matches: bool },
}

async fn inspect(dir: &Path, mode: u32) -> anyhow::Result<Inspection> {
    let meta = match fs::metadata(dir).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Inspection::Missing),
        Err(err) => return Err(err).with_context(|| format!("stat {:?}", dir)),
    };

    if !meta.is_dir() {
        return Ok(Inspection::NotADirectory);
    }

    Ok(Inspection::Directory {
        mode_matches: mode_of(&meta) == mode,
    })
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    DEFAULT_DIR_MODE
}

#[cfg(unix)]
async fn set_mode(dir: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, std::fs::Permissions::from_mode(mode))
        .await
        .with_context(|| format!("chmod {:?} to {:o}", dir, mode))
}

#[cfg(not(unix))]
async fn set_mode(_dir: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}

impl Action for Mkdir {
    type Output = ();

    fn name(&self) -> String {
        format!("mkdir {}", self.dir.display())
    }

    fn is_completed(&self) -> ActionFuture<'_, bool> {
        Box::pin(async move {
            let inspection = inspect(&self.dir, self.mode).await?;
            Ok(matches!(
                inspection,
                Inspection::Directory { mode_matches: true }
            ))
        })
    }

    fn perform<'a>(&'a self, _ctx: &'a Context) -> ActionFuture<'a, ()> {
        Box::pin(async move {
            match inspect(&self.dir, self.mode).await? {
                Inspection::Missing => {
                    fs::create_dir_all(&self.dir)
                        .await
                        .with_context(|| format!("mkdir {:?}", self.dir))?;
                    info!(dir = %self.dir.display(), mode = %format!("{:o}", self.mode), "created directory");
                }
                Inspection::NotADirectory => {
                    bail!("{:?} is a file, not a directory", self.dir);
                }
                Inspection::Directory { .. } => {}
            }
            set_mode(&self.dir, self.mode).await
        })
    }
}
