// src/exec/mod.rs

//! Shell command execution and Mkfile tasks.
//!
//! - [`command`] runs one cancellable `<shell> -c` command.
//! - [`shell_task`] wraps a Mkfile task as an idempotent action.
//! - [`plan`] registers those actions as graph tasks and resolves targets.

pub mod command;
pub mod plan;
pub mod shell_task;

pub use command::{run_shell, CommandOutput};
pub use plan::{build_system, run_targets, PlanEnv};
pub use shell_task::{lock_fingerprints, Fingerprints, ShellTask};
