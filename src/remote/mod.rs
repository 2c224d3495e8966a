// src/remote/mod.rs

//! Remote host capability.
//!
//! Effects against a host go through the [`Connection`] trait so the agent
//! and container layers never depend on a particular transport. Tests plug in
//! a scripted fake; [`LocalConnection`] runs against a directory on this
//! machine, which is also what `mk` uses when no transport is configured.
//!
//! - [`agent`] installs the helper binary and talks JSON to it.

pub mod agent;

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use anyhow::{bail, Context as _, Result};
use tokio::fs;
use tracing::debug;

use crate::exec::{run_shell, CommandOutput};
use crate::idempotent::Context;

pub use agent::{ensure_agent, shell_quote, Agent, InstallAgent, RemoteMkdir};

pub type ConnFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A host commands can be run on and files uploaded to.
pub trait Connection: Send + Sync {
    /// Label used in logs.
    fn host(&self) -> &str;

    /// Run a shell command. A non-zero exit is reported through
    /// [`CommandOutput::code`], not as an error.
    fn run<'a>(&'a self, ctx: &'a Context, command: &'a str) -> ConnFuture<'a, CommandOutput>;

    /// Write `contents` to `remote_path` with permission bits `mode`,
    /// replacing any existing file.
    fn upload<'a>(
        &'a self,
        ctx: &'a Context,
        contents: &'a [u8],
        remote_path: &'a str,
        mode: u32,
    ) -> ConnFuture<'a, ()>;
}

/// A [`Connection`] to this machine, rooted at a working directory.
///
/// Commands run through `sh -c` with `root` as the current directory.
/// Relative upload paths resolve against `root`.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    host: String,
    root: PathBuf,
}

impl LocalConnection {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            host: "localhost".to_string(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote_path: &str) -> Result<PathBuf> {
        let path = Path::new(remote_path);
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            bail!("upload path {:?} escapes the connection root", remote_path);
        }
        Ok(self.root.join(path))
    }
}

#[cfg(unix)]
async fn set_file_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .with_context(|| format!("chmod {:?} to {:o}", path, mode))
}

#[cfg(not(unix))]
async fn set_file_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

impl Connection for LocalConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn run<'a>(&'a self, ctx: &'a Context, command: &'a str) -> ConnFuture<'a, CommandOutput> {
        Box::pin(async move {
            debug!(host = %self.host, cmd = %command, "running command");
            run_shell(ctx, "sh", command, &self.root, &Default::default()).await
        })
    }

    fn upload<'a>(
        &'a self,
        ctx: &'a Context,
        contents: &'a [u8],
        remote_path: &'a str,
        mode: u32,
    ) -> ConnFuture<'a, ()> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                bail!("upload of {:?} cancelled", remote_path);
            }

            let dest = self.resolve(remote_path)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {:?}", parent))?;
            }
            fs::write(&dest, contents)
                .await
                .with_context(|| format!("writing {:?}", dest))?;
            set_file_mode(&dest, mode).await?;

            debug!(host = %self.host, path = %dest.display(), bytes = contents.len(), "uploaded file");
            Ok(())
        })
    }
}
