// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod container;
pub mod edit;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod idempotent;
pub mod logging;
pub mod remote;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::cache::FileStamp;
use crate::cli::{AgentCommand, CliArgs, Command, EditCommand};
use crate::config::{load_and_validate, Mkfile};
use crate::exec::{build_system, lock_fingerprints, run_targets, Fingerprints, PlanEnv};
use crate::idempotent::{Context, Mkdir, MkdirOptions};
use crate::remote::{Agent, Connection, LocalConnection};

/// Hash cache used by `mk agent install`, relative to the host root.
const AGENT_HASH_CACHE: &str = ".mk/hashes.json";

/// Remaining stack below which recursive evaluation switches segments.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each freshly allocated stack segment.
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Run `f`, continuing on a new stack segment when the current one is
/// nearly exhausted. Graph builds and memoized evaluation recurse once per
/// dependency and go through here.
pub(crate) fn on_growable_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, f)
}

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run { tasks } => run_tasks(&args.config, tasks).await,
        Command::List => list_tasks(&args.config),
        Command::Prune { all } => prune(&args.config, all),
        Command::Edit { command } => edit(command).await,
        Command::Agent { root, command } => agent(root, command).await,
    }
}

/// Directory commands run in: the Mkfile's parent, or the current directory
/// for a bare file name.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn cache_path(cfg: &Mkfile, root: &Path) -> PathBuf {
    root.join(&cfg.config.cache_file)
}

/// Cancel `ctx`'s handle on Ctrl-C.
fn context_with_ctrl_c() -> Context {
    let (ctx, handle) = Context::with_cancel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; cancelling running commands");
        handle.cancel();
    });
    ctx
}

async fn ensure_state_dir(ctx: &Context, cache_file: &Path, root: &Path) -> Result<()> {
    let Some(dir) = cache_file.parent() else {
        return Ok(());
    };
    if dir == root || dir.as_os_str().is_empty() {
        return Ok(());
    }
    let mkdir = Mkdir::new(MkdirOptions {
        dir: dir.to_path_buf(),
        mode: None,
    });
    idempotent::perform(ctx, &mkdir).await?;
    Ok(())
}

async fn run_tasks(config_path: &Path, tasks: Vec<String>) -> Result<()> {
    let cfg = load_and_validate(config_path)?;
    let root = config_root_dir(config_path);
    let cache_file = cache_path(&cfg, &root);

    let ctx = context_with_ctrl_c();
    ensure_state_dir(&ctx, &cache_file, &root).await?;

    let fingerprints: Fingerprints = Arc::new(Mutex::new(cache::load(&cache_file)));
    let targets = if tasks.is_empty() {
        cfg.task_names().map(str::to_string).collect()
    } else {
        tasks
    };
    info!(?targets, "running tasks");

    let env = PlanEnv {
        handle: Handle::current(),
        ctx,
        fingerprints: fingerprints.clone(),
    };
    let result = tokio::task::spawn_blocking(move || {
        let mut system = build_system(&cfg, &root, env)?;
        let done = run_targets(&mut system, &targets)?;
        debug!(invocations = system.invocations(), "graph evaluation finished");
        Ok::<_, errors::GraphError>(done)
    })
    .await
    .context("task graph thread")?;

    // Fingerprints are only recorded by tasks that succeeded, so they are
    // worth keeping even when a later task failed.
    cache::save(&cache_file, &*lock_fingerprints(&fingerprints));

    let done = result?;
    info!(tasks = done.len(), "all tasks done");
    Ok(())
}

fn list_tasks(config_path: &Path) -> Result<()> {
    let cfg = load_and_validate(config_path)?;

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in &cfg.task {
        match &task.description {
            Some(description) => println!("  - {name}: {description}"),
            None => println!("  - {name}"),
        }
        println!("      cmd: {}", task.cmd);
        if !task.needs.is_empty() {
            println!("      needs: {:?}", task.needs);
        }
        if !task.sources.is_empty() {
            println!("      sources: {:?}", task.sources);
        }
        if let Some(creates) = &task.creates {
            println!("      creates: {}", creates.display());
        }
    }
    Ok(())
}

fn prune(config_path: &Path, all: bool) -> Result<()> {
    let cfg = load_and_validate(config_path)?;
    let root = config_root_dir(config_path);
    let cache_file = cache_path(&cfg, &root);

    if all {
        return remove_file_if_exists(&cache_file);
    }

    let mut fingerprints: cache::Cache<String, String> = cache::load(&cache_file);
    let before = fingerprints.len();
    fingerprints.retain(|task| cfg.task.contains_key(task));
    if fingerprints.len() < before {
        cache::save(&cache_file, &fingerprints);
        info!(removed = before - fingerprints.len(), "pruned stale task fingerprints");
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed cache file");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("rm cache file {:?}", path)),
    }
}

async fn edit(command: EditCommand) -> Result<()> {
    match command {
        EditCommand::Dist {
            first,
            second,
            graph: true,
            ..
        } => {
            let (distance, invocations) = tokio::task::spawn_blocking(move || {
                let (distance, system) = edit::distance_graph(&first, &second)?;
                Ok::<_, errors::GraphError>((distance, system.invocations()))
            })
            .await
            .context("edit distance thread")??;
            info!(distance, invocations, "distance found");
            println!("{distance}");
        }
        EditCommand::Dist {
            first,
            second,
            graph: false,
            cache: cache_file,
        } => {
            let distance = cache::with_cache(&cache_file, |c: &mut cache::Cache<edit::EditKey, usize>| {
                Ok::<_, anyhow::Error>(edit::distance_cached(&first, &second, c))
            })?;
            info!(distance, "distance found");
            println!("{distance}");
        }
        EditCommand::Prune { cache: cache_file } => remove_file_if_exists(&cache_file)?,
    }
    Ok(())
}

async fn agent(root: PathBuf, command: AgentCommand) -> Result<()> {
    let conn: Arc<dyn Connection> = Arc::new(LocalConnection::new(&root));
    let ctx = context_with_ctrl_c();

    match command {
        AgentCommand::Install { binary } => {
            let hash_file = root.join(AGENT_HASH_CACHE);
            let hashes: cache::Cache<FileStamp, String> = cache::load(&hash_file);
            let hashes = Arc::new(Mutex::new(hashes));

            Agent::install(&ctx, conn, binary, Some(hashes.clone())).await?;

            let hashes = hashes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            cache::save(&hash_file, &*hashes);
        }
        AgentCommand::Version => {
            let version = Agent::new(conn).version(&ctx).await?;
            println!("{version}");
        }
    }
    Ok(())
}
