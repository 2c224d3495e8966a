// src/exec/command.rs

//! Cancellable shell command execution.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::idempotent::Context;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `-1` when the process was killed by a signal.
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `script` through `<shell> -c` in `cwd` and capture its output.
///
/// A non-zero exit is not an error here; callers inspect
/// [`CommandOutput::code`]. If `ctx` is cancelled first the child is killed
/// and an error is returned.
pub async fn run_shell(
    ctx: &Context,
    shell: &str,
    script: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<CommandOutput> {
    debug!(shell = %shell, cwd = %cwd.display(), cmd = %script, "spawning command");

    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(script)
        .current_dir(cwd)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning `{} -c {:?}`", shell, script))?;

    // Dropping the `wait_with_output` future drops the child, which kills it.
    let output = tokio::select! {
        out = child.wait_with_output() => {
            out.with_context(|| format!("waiting for `{}`", script))?
        }
        _ = ctx.cancelled() => {
            info!(cmd = %script, "cancellation requested; killing process");
            bail!("command {:?} cancelled", script);
        }
    };

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code().unwrap_or(-1),
    };
    debug!(cmd = %script, exit_code = result.code, "command exited");
    Ok(result)
}
