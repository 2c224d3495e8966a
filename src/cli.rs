// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `mk`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mk",
    version,
    about = "Run tasks whose dependencies are pulled on demand and whose effects are idempotent.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task file (TOML).
    #[arg(
        long,
        value_name = "PATH",
        default_value_os_t = crate::config::default_config_path(),
        global = true
    )]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run tasks (all of them when none are named), pulling their `needs`
    /// first.
    Run {
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,
    },

    /// List declared tasks.
    List,

    /// Drop cached fingerprints of tasks that no longer exist.
    Prune {
        /// Delete the whole cache file instead.
        #[arg(long)]
        all: bool,
    },

    /// Edit distance between two strings.
    Edit {
        #[command(subcommand)]
        command: EditCommand,
    },

    /// Manage the `mk-agent` helper in a host directory.
    Agent {
        /// Directory standing in for the remote host.
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: PathBuf,

        #[command(subcommand)]
        command: AgentCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum EditCommand {
    /// Calculate edit distance between two strings.
    Dist {
        first: String,
        second: String,

        /// Evaluate through the task graph instead of the persistent cache.
        #[arg(long)]
        graph: bool,

        #[arg(long, value_name = "PATH", default_value = ".mk/edit.json")]
        cache: PathBuf,
    },

    /// Remove the edit-distance cache file.
    Prune {
        #[arg(long, value_name = "PATH", default_value = ".mk/edit.json")]
        cache: PathBuf,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum AgentCommand {
    /// Upload the agent binary unless an identical copy is installed.
    Install {
        #[arg(long, value_name = "PATH", default_value = "mk-agent")]
        binary: PathBuf,
    },

    /// Print the installed agent's version.
    Version,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
