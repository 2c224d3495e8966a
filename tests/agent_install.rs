// tests/agent_install.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::sync::{Arc, Mutex};

use mk::cache::{hash_file, Cache};
use mk::container::{ContainerId, ContainerPolicy, ContainerState};
use mk::idempotent::{perform, Context, Outcome};
use mk::remote::agent::{agent_path, AGENT_FILE_MODE};
use mk::remote::{ensure_agent, shell_quote, Agent, Connection, InstallAgent, LocalConnection, RemoteMkdir};
use mk_test_utils::fake_connection::{FakeConnection, Upload};
use mk_test_utils::fake_runtime::container_from_policy;
use mk_test_utils::init_tracing;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn shell_quote_leaves_plain_words_alone() {
    assert_eq!(shell_quote("docker"), "docker");
    assert_eq!(shell_quote(".mk/mk-agent"), ".mk/mk-agent");
    assert_eq!(shell_quote(""), "''");
    assert_eq!(shell_quote("two words"), "'two words'");
    assert_eq!(shell_quote(r#"{"a":1}"#), r#"'{"a":1}'"#);
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
}

#[tokio::test]
async fn missing_agent_is_uploaded_with_exec_mode() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let binary = dir.path().join("mk-agent");
    fs::write(&binary, b"#!/bin/sh\necho 1.0\n")?;

    let fake = FakeConnection::new();
    fake.respond_err(
        "sha256sum",
        1,
        "sha256sum: .mk/mk-agent: No such file or directory",
    );
    let conn: Arc<dyn Connection> = Arc::new(fake.clone());

    let outcomes = ensure_agent(&Context::background(), conn, &binary, None).await?;

    // `test -d` succeeds on the fake, so only the install step runs.
    assert_eq!(outcomes, vec![Outcome::AlreadyDone, Outcome::Performed(())]);
    assert_eq!(
        fake.uploads(),
        vec![Upload {
            path: agent_path(),
            contents: b"#!/bin/sh\necho 1.0\n".to_vec(),
            mode: AGENT_FILE_MODE,
        }]
    );
    assert_eq!(
        fake.commands(),
        vec!["test -d .mk", "sha256sum .mk/mk-agent"]
    );

    Ok(())
}

#[tokio::test]
async fn matching_hash_skips_the_upload() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let binary = dir.path().join("mk-agent");
    fs::write(&binary, b"agent v2")?;
    let local = hash_file(&binary)?;

    let fake = FakeConnection::new();
    fake.respond_ok("sha256sum", &format!("{local}  .mk/mk-agent\n"));
    let conn: Arc<dyn Connection> = Arc::new(fake.clone());
    let hashes = Arc::new(Mutex::new(Cache::new()));

    let outcomes = ensure_agent(&Context::background(), conn, &binary, Some(hashes.clone())).await?;

    assert_eq!(outcomes, vec![Outcome::AlreadyDone, Outcome::AlreadyDone]);
    assert!(fake.uploads().is_empty());
    assert_eq!(hashes.lock().unwrap().len(), 1);

    Ok(())
}

#[tokio::test]
async fn missing_directory_is_created_first() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let binary = dir.path().join("mk-agent");
    fs::write(&binary, b"agent")?;

    let fake = FakeConnection::new();
    fake.respond_err("test -d", 1, "")
        .respond_err("sha256sum", 1, "No such file or directory");
    let conn: Arc<dyn Connection> = Arc::new(fake.clone());

    ensure_agent(&Context::background(), conn, &binary, None).await?;

    let commands = fake.commands();
    assert_eq!(commands[1], "mkdir -p -m 755 .mk");
    assert_eq!(fake.uploads().len(), 1);

    Ok(())
}

#[tokio::test]
async fn remote_mkdir_uses_the_requested_mode() -> TestResult {
    init_tracing();

    let fake = FakeConnection::new();
    fake.respond_err("test -d", 1, "");
    let conn: Arc<dyn Connection> = Arc::new(fake.clone());

    let action = RemoteMkdir::new(conn, "state dir").with_mode(0o700);
    let outcome = perform(&Context::background(), &action).await?;

    assert_eq!(outcome, Outcome::Performed(()));
    assert_eq!(
        fake.commands(),
        vec!["test -d 'state dir'", "mkdir -p -m 700 'state dir'"]
    );

    Ok(())
}

#[tokio::test]
async fn install_honours_a_custom_remote_path() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let binary = dir.path().join("mk-agent");
    fs::write(&binary, b"agent v3")?;

    let fake = FakeConnection::new();
    fake.respond_err("sha256sum", 1, "sha256sum: opt/mk/agent: No such file or directory");
    let conn: Arc<dyn Connection> = Arc::new(fake.clone());

    let action = InstallAgent::new(conn, binary.clone()).with_remote_path("opt/mk/agent");
    let outcome = perform(&Context::background(), &action).await?;

    assert_eq!(outcome, Outcome::Performed(()));
    assert_eq!(fake.commands(), vec!["sha256sum opt/mk/agent"]);
    assert_eq!(
        fake.uploads(),
        vec![Upload {
            path: "opt/mk/agent".to_string(),
            contents: b"agent v3".to_vec(),
            mode: AGENT_FILE_MODE,
        }]
    );

    Ok(())
}

#[tokio::test]
async fn unexpected_hash_failure_aborts_the_install() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let binary = dir.path().join("mk-agent");
    fs::write(&binary, b"agent")?;

    let fake = FakeConnection::new();
    fake.respond_err("sha256sum", 1, "Permission denied");
    let conn: Arc<dyn Connection> = Arc::new(fake.clone());

    let err = ensure_agent(&Context::background(), conn, &binary, None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "action #1");
    assert!(fake.uploads().is_empty());

    Ok(())
}

#[tokio::test]
async fn agent_commands_are_shell_quoted() -> TestResult {
    init_tracing();

    let policy = ContainerPolicy {
        name: "web".into(),
        image: "nginx:1.27".into(),
        ..Default::default()
    };
    let listed = BTreeMap::from([(
        ContainerId::from("c1"),
        container_from_policy("c1", &policy, "sha256:abc", ContainerState::Running),
    )]);

    let fake = FakeConnection::new();
    fake.respond_ok("./.mk/mk-agent version", "0.3.1\n")
        .respond_ok(
            "./.mk/mk-agent docker container ls",
            &serde_json::to_string(&listed)?,
        );
    let agent = Agent::new(Arc::new(fake.clone()));
    let ctx = Context::background();

    assert_eq!(agent.version(&ctx).await?, "0.3.1");
    assert_eq!(agent.list_containers(&ctx).await?, listed);

    agent.reconcile_containers(&ctx, std::slice::from_ref(&policy)).await?;
    let reconcile = fake.commands().pop().unwrap_or_default();
    let json = serde_json::to_string(&[&policy])?;
    assert_eq!(
        reconcile,
        format!("./.mk/mk-agent docker container reconcile '{json}'")
    );

    Ok(())
}

#[tokio::test]
async fn agent_failures_and_bad_json_are_errors() -> TestResult {
    init_tracing();

    let fake = FakeConnection::new();
    fake.respond_err("./.mk/mk-agent version", 2, "boom")
        .respond_ok("./.mk/mk-agent docker container ls", "not json");
    let agent = Agent::new(Arc::new(fake));
    let ctx = Context::background();

    let err = agent.version(&ctx).await.unwrap_err();
    assert!(err.to_string().contains("code=2"), "{err}");

    let err = agent.list_containers(&ctx).await.unwrap_err();
    assert!(err.to_string().contains("json decode"), "{err}");

    Ok(())
}

#[tokio::test]
async fn local_connection_runs_and_uploads_under_its_root() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let conn = LocalConnection::new(dir.path());
    let ctx = Context::background();
    assert_eq!(conn.root(), dir.path());

    let out = conn.run(&ctx, "pwd && echo err >&2 && exit 4").await?;
    assert_eq!(out.code, 4);
    assert_eq!(out.stderr, "err\n");
    assert_eq!(
        fs::canonicalize(out.stdout.trim())?,
        fs::canonicalize(dir.path())?
    );

    conn.upload(&ctx, b"payload", "bin/tool", 0o700).await?;
    assert_eq!(fs::read(dir.path().join("bin/tool"))?, b"payload");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(dir.path().join("bin/tool"))?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    assert!(conn.upload(&ctx, b"x", "../escape", 0o600).await.is_err());

    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn local_install_is_idempotent() -> TestResult {
    init_tracing();

    let host = tempdir()?;
    let build = tempdir()?;
    let binary = build.path().join("mk-agent");
    fs::write(&binary, b"#!/bin/sh\necho 9.9.9\n")?;

    let conn: Arc<dyn Connection> = Arc::new(LocalConnection::new(host.path()));
    let ctx = Context::background();

    let first = ensure_agent(&ctx, conn.clone(), &binary, None).await?;
    assert_eq!(first, vec![Outcome::Performed(()), Outcome::Performed(())]);
    assert_eq!(fs::read(host.path().join(".mk/mk-agent"))?, fs::read(&binary)?);

    let second = ensure_agent(&ctx, conn.clone(), &binary, None).await?;
    assert_eq!(second, vec![Outcome::AlreadyDone, Outcome::AlreadyDone]);

    let agent = Agent::new(conn);
    assert_eq!(agent.version(&ctx).await?, "9.9.9");

    Ok(())
}
