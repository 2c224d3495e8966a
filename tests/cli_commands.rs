// tests/cli_commands.rs

use std::error::Error;
use std::fs;
use std::path::Path;

use clap::Parser;
use mk::cache::{self, Cache};
use mk::cli::{CliArgs, Command, EditCommand, LogLevel};
use mk::logging::resolve_level;
use mk_test_utils::init_tracing;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

fn args(argv: &[&str]) -> CliArgs {
    CliArgs::try_parse_from(std::iter::once("mk").chain(argv.iter().copied()))
        .expect("arguments should parse")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn global_flags_parse_after_the_subcommand() {
    let parsed = args(&["run", "build", "test", "--config", "other.toml", "--log-level", "debug"]);

    assert_eq!(parsed.config, Path::new("other.toml"));
    assert!(matches!(parsed.log_level, Some(LogLevel::Debug)));
    match parsed.command {
        Command::Run { tasks } => assert_eq!(tasks, vec!["build", "test"]),
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn edit_defaults() {
    let parsed = args(&["edit", "dist", "kitten", "sitting"]);

    assert_eq!(parsed.config, mk::config::default_config_path());
    assert_eq!(parsed.config, Path::new("Mkfile.toml"));
    match parsed.command {
        Command::Edit {
            command: EditCommand::Dist { first, second, graph, cache },
        } => {
            assert_eq!((first.as_str(), second.as_str()), ("kitten", "sitting"));
            assert!(!graph);
            assert_eq!(cache, Path::new(".mk/edit.json"));
        }
        other => panic!("expected edit dist, got {other:?}"),
    }
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(CliArgs::try_parse_from(["mk", "watch"]).is_err());
}

#[test]
fn log_level_prefers_the_flag_then_the_environment() {
    assert_eq!(resolve_level(Some(LogLevel::Trace), Some("error")), tracing::Level::TRACE);
    assert_eq!(resolve_level(None, Some(" Warning ")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("loud")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_records_fingerprints_and_prune_drops_stale_ones() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = dir.path();
    let mkfile = root.join("Mkfile.toml");
    fs::write(root.join("main.c"), "int main(void) { return 0; }")?;
    fs::write(
        &mkfile,
        r#"
[task.build]
cmd = "cp main.c app"
sources = ["*.c"]
creates = "app"

[task.check]
cmd = "test -f app"
needs = ["build"]
"#,
    )?;

    mk::run(args(&["--config", &path_arg(&mkfile), "run"])).await?;

    assert!(root.join("app").is_file());
    let cache_file = root.join(".mk/cache.json");
    let stored: Cache<String, String> = cache::load(&cache_file);
    assert!(stored.contains(&"build".to_string()));

    fs::write(
        &mkfile,
        r#"
[task.check]
cmd = "true"
"#,
    )?;
    mk::run(args(&["--config", &path_arg(&mkfile), "prune"])).await?;

    let stored: Cache<String, String> = cache::load(&cache_file);
    assert!(stored.is_empty());

    mk::run(args(&["--config", &path_arg(&mkfile), "prune", "--all"])).await?;
    assert!(!cache_file.exists());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_fails_for_an_unknown_task() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let mkfile = dir.path().join("Mkfile.toml");
    fs::write(&mkfile, "[task.only]\ncmd = \"true\"\n")?;

    let result = mk::run(args(&["--config", &path_arg(&mkfile), "run", "other"])).await;
    let err = result.expect_err("unknown task must fail");
    assert!(format!("{err:#}").contains("\"other\" was not found"), "{err:#}");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edit_dist_persists_and_prunes_its_cache() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let cache_file = dir.path().join("edit.json");
    let cache_arg = path_arg(&cache_file);

    mk::run(args(&["edit", "dist", "kitten", "sitting", "--cache", &cache_arg])).await?;
    let stored: Cache<mk::edit::EditKey, usize> = cache::load(&cache_file);
    assert!(!stored.is_empty());

    mk::run(args(&["edit", "dist", "kitten", "sitting", "--graph"])).await?;

    mk::run(args(&["edit", "prune", "--cache", &cache_arg])).await?;
    assert!(!cache_file.exists());

    Ok(())
}
