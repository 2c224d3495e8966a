// src/remote/agent.rs

//! The `mk-agent` helper binary.
//!
//! Installing the agent is idempotent: the remote copy is only replaced when
//! its `sha256sum` differs from the local binary's hash. Once installed, the
//! agent is driven with `<agent> <command...> [json-arg]` and answers with JSON
//! on stdout.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{hash_file, hash_file_cached, Cache, FileStamp};
use crate::container::{ContainerConfig, ContainerId, ContainerPolicy};
use crate::errors::ActionError;
use crate::idempotent::{multistep, Action, ActionFuture, Context, Outcome};
use crate::remote::Connection;

pub const AGENT_EXECUTABLE: &str = "mk-agent";

/// Remote directory the agent is installed into.
pub const AGENT_DIR: &str = ".mk";

/// Permission bits of the uploaded agent binary.
pub const AGENT_FILE_MODE: u32 = 0o700;

const AGENT_DIR_MODE: u32 = 0o755;

/// Shared file-hash cache so repeated installs don't re-hash the binary.
pub type HashCache = Arc<Mutex<Cache<FileStamp, String>>>;

/// Remote path of the agent binary.
pub fn agent_path() -> String {
    format!("{AGENT_DIR}/{AGENT_EXECUTABLE}")
}

/// Quote `arg` for a POSIX shell. Plain words are left as they are.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn join_command<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ensure a remote directory exists.
pub struct RemoteMkdir {
    conn: Arc<dyn Connection>,
    dir: String,
    mode: u32,
}

impl RemoteMkdir {
    pub fn new(conn: Arc<dyn Connection>, dir: impl Into<String>) -> Self {
        Self {
            conn,
            dir: dir.into(),
            mode: AGENT_DIR_MODE,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

impl Action for RemoteMkdir {
    type Output = ();

    fn name(&self) -> String {
        format!("mkdir {}:{}", self.conn.host(), self.dir)
    }

    fn is_completed(&self) -> ActionFuture<'_, bool> {
        Box::pin(async move {
            let ctx = Context::background();
            let cmd = format!("test -d {}", shell_quote(&self.dir));
            let out = self.conn.run(&ctx, &cmd).await?;
            Ok(out.success())
        })
    }

    fn perform<'a>(&'a self, ctx: &'a Context) -> ActionFuture<'a, ()> {
        Box::pin(async move {
            let cmd = format!("mkdir -p -m {:o} {}", self.mode, shell_quote(&self.dir));
            let out = self.conn.run(ctx, &cmd).await?;
            if !out.success() {
                bail!("{}: {}", cmd, out.stderr.trim());
            }
            info!(host = %self.conn.host(), dir = %self.dir, "created remote directory");
            Ok(())
        })
    }
}

/// Upload the local agent binary unless the remote copy is identical.
pub struct InstallAgent {
    conn: Arc<dyn Connection>,
    local: PathBuf,
    remote_path: String,
    hashes: Option<HashCache>,
}

impl InstallAgent {
    pub fn new(conn: Arc<dyn Connection>, local: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            local: local.into(),
            remote_path: agent_path(),
            hashes: None,
        }
    }

    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = remote_path.into();
        self
    }

    /// Memoize the local hash in `hashes`, keyed by file stamp.
    pub fn with_hash_cache(mut self, hashes: HashCache) -> Self {
        self.hashes = Some(hashes);
        self
    }

    fn local_hash(&self) -> Result<String> {
        let hash = match &self.hashes {
            Some(hashes) => {
                let mut hashes = hashes.lock().unwrap_or_else(PoisonError::into_inner);
                hash_file_cached(&mut hashes, &self.local)
            }
            None => hash_file(&self.local),
        };
        hash.context("get local agent binary hash")
    }

    /// `None` when the agent is not installed.
    async fn remote_hash(&self, ctx: &Context) -> Result<Option<String>> {
        let cmd = format!("sha256sum {}", shell_quote(&self.remote_path));
        let out = self.conn.run(ctx, &cmd).await?;

        if !out.success() {
            if out.stderr.contains("No such file or directory") {
                info!(host = %self.conn.host(), "mk-agent is not installed remotely");
                return Ok(None);
            }
            bail!("get remote mk-agent hash: {}: {}", cmd, out.stderr.trim());
        }

        match out.stdout.split_whitespace().next() {
            Some(hash) => Ok(Some(hash.to_string())),
            None => bail!("unexpected sha256sum output {:?}", out.stdout),
        }
    }
}

impl Action for InstallAgent {
    type Output = ();

    fn name(&self) -> String {
        format!("install agent on {}", self.conn.host())
    }

    fn is_completed(&self) -> ActionFuture<'_, bool> {
        Box::pin(async move {
            let ctx = Context::background();
            let Some(remote) = self.remote_hash(&ctx).await? else {
                return Ok(false);
            };
            let local = self.local_hash()?;
            debug!(remote_hash = %remote, local_hash = %local, "comparing agent hashes");
            Ok(remote == local)
        })
    }

    fn perform<'a>(&'a self, ctx: &'a Context) -> ActionFuture<'a, ()> {
        Box::pin(async move {
            let contents = tokio::fs::read(&self.local)
                .await
                .with_context(|| format!("open agent binary {:?}", self.local))?;
            self.conn
                .upload(ctx, &contents, &self.remote_path, AGENT_FILE_MODE)
                .await
                .context("upload agent binary")?;
            info!(host = %self.conn.host(), path = %self.remote_path, "installed mk-agent");
            Ok(())
        })
    }
}

/// Create the agent directory, then install the agent, in that order.
pub async fn ensure_agent(
    ctx: &Context,
    conn: Arc<dyn Connection>,
    local: impl Into<PathBuf>,
    hashes: Option<HashCache>,
) -> Result<Vec<Outcome<()>>, ActionError> {
    let mut install = InstallAgent::new(conn.clone(), local);
    if let Some(hashes) = hashes {
        install = install.with_hash_cache(hashes);
    }

    let steps: Vec<Box<dyn Action<Output = ()>>> =
        vec![Box::new(RemoteMkdir::new(conn, AGENT_DIR)), Box::new(install)];
    multistep(ctx, &steps).await
}

/// Client for an installed agent.
#[derive(Clone)]
pub struct Agent {
    conn: Arc<dyn Connection>,
    path: String,
}

impl Agent {
    /// Wrap a connection whose agent is already installed at [`agent_path`].
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            path: agent_path(),
        }
    }

    /// Install the agent from `local` and return a client for it.
    pub async fn install(
        ctx: &Context,
        conn: Arc<dyn Connection>,
        local: impl Into<PathBuf>,
        hashes: Option<HashCache>,
    ) -> Result<Self> {
        ensure_agent(ctx, conn.clone(), local, hashes).await?;
        Ok(Self::new(conn))
    }

    fn command_line(&self, cmd: &[&str], arg: Option<&str>) -> String {
        let program = format!("./{}", self.path);
        let args = std::iter::once(program.as_str())
            .chain(cmd.iter().copied())
            .chain(arg);
        join_command(args)
    }

    async fn call(&self, ctx: &Context, cmd: &[&str], arg: Option<&str>) -> Result<String> {
        let line = self.command_line(cmd, arg);
        let out = self.conn.run(ctx, &line).await?;
        if !out.success() {
            bail!(
                "agent call, cmd={:?}, code={}, stderr={:?}",
                cmd,
                out.code,
                out.stderr.trim()
            );
        }
        Ok(out.stdout)
    }

    /// Run an agent command and decode its stdout as JSON.
    pub async fn query<T>(&self, ctx: &Context, cmd: &[&str]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let stdout = self.call(ctx, cmd, None).await?;
        serde_json::from_str(&stdout)
            .with_context(|| format!("json decode call result, cmd={:?}, stdout={:?}", cmd, stdout))
    }

    /// Run an agent command with `arg` passed as a JSON argument.
    pub async fn execute<A>(&self, ctx: &Context, cmd: &[&str], arg: &A) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        let json = serde_json::to_string(arg).context("json encode agent argument")?;
        let stdout = self.call(ctx, cmd, Some(&json)).await?;
        if !stdout.trim().is_empty() {
            info!(cmd = ?cmd, "{}", stdout.trim());
        }
        Ok(())
    }

    pub async fn version(&self, ctx: &Context) -> Result<String> {
        Ok(self.call(ctx, &["version"], None).await?.trim().to_string())
    }

    pub async fn list_containers(
        &self,
        ctx: &Context,
    ) -> Result<std::collections::BTreeMap<ContainerId, ContainerConfig>> {
        self.query(ctx, &["docker", "container", "ls"]).await
    }

    pub async fn reconcile_containers(&self, ctx: &Context, policies: &[ContainerPolicy]) -> Result<()> {
        self.execute(ctx, &["docker", "container", "reconcile"], policies)
            .await
    }
}
