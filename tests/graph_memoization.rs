// tests/graph_memoization.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mk::errors::GraphError;
use mk::graph::{Fetch, KeyPart, Package, Resource, ResourceKey, System, Task};
use mk_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn counted(counter: &Arc<AtomicUsize>) -> Arc<AtomicUsize> {
    Arc::clone(counter)
}

/// d <- b, d <- c, b <- a, c <- a. Every task counts its invocations.
fn diamond() -> (System, [Arc<AtomicUsize>; 4]) {
    let counters: [Arc<AtomicUsize>; 4] = Default::default();
    let mut system = System::new();

    let ca = counted(&counters[0]);
    system
        .register(
            "a",
            Task::single(ResourceKey::new("a"), move |_| {
                ca.fetch_add(1, Ordering::SeqCst);
                Ok(Resource::Int(1))
            }),
        )
        .unwrap();

    let cb = counted(&counters[1]);
    system
        .register(
            "b",
            Task::single(ResourceKey::new("b"), move |fetch| {
                cb.fetch_add(1, Ordering::SeqCst);
                Ok(Resource::Int(fetch.int(&ResourceKey::new("a"))? + 10))
            }),
        )
        .unwrap();

    let cc = counted(&counters[2]);
    system
        .register(
            "c",
            Task::single(ResourceKey::new("c"), move |fetch| {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok(Resource::Int(fetch.int(&ResourceKey::new("a"))? + 100))
            }),
        )
        .unwrap();

    let cd = counted(&counters[3]);
    system
        .register(
            "d",
            Task::single(ResourceKey::new("d"), move |fetch| {
                cd.fetch_add(1, Ordering::SeqCst);
                let b = fetch.int(&ResourceKey::new("b"))?;
                let c = fetch.int(&ResourceKey::new("c"))?;
                Ok(Resource::Int(b + c))
            }),
        )
        .unwrap();

    (system, counters)
}

#[test]
fn fetch_memoizes_within_a_run() -> TestResult {
    init_tracing();

    let (mut system, counters) = diamond();

    assert_eq!(system.int(&ResourceKey::new("b"))?, 11);
    assert_eq!(system.int(&ResourceKey::new("b"))?, 11);
    assert_eq!(counters[1].load(Ordering::SeqCst), 1);
    assert_eq!(counters[0].load(Ordering::SeqCst), 1);
    assert_eq!(system.invocations(), 2);

    Ok(())
}

#[test]
fn diamond_dependency_is_computed_once() -> TestResult {
    init_tracing();

    let (mut system, counters) = diamond();

    let built = system.build("d")?;
    assert_eq!(built.len(), 1);
    assert_eq!(built[0].as_int(), Some(112));

    let per_task: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(per_task, vec![1, 1, 1, 1]);
    assert_eq!(system.invocations(), 4);
    assert_eq!(system.resource_count(), 4);

    Ok(())
}

#[test]
fn unknown_task_fails_without_touching_the_store() {
    init_tracing();

    let (mut system, _) = diamond();
    let err = system.build("nope").unwrap_err();

    assert!(matches!(err, GraphError::TaskNotFound(ref name) if name == "nope"));
    assert_eq!(system.resource_count(), 0);
    assert_eq!(system.invocations(), 0);
}

#[test]
fn missing_resource_without_producer_is_unbuildable() {
    init_tracing();

    let mut system = System::new();
    let err = system.fetch(&ResourceKey::new("ghost").int(1)).unwrap_err();

    match err {
        GraphError::ResourceUnbuildable(key) => assert_eq!(key, "ghost(1)"),
        other => panic!("expected ResourceUnbuildable, got {other:?}"),
    }
}

#[test]
fn seeded_resources_are_served_before_any_task() -> TestResult {
    init_tracing();

    let key = ResourceKey::new("x");
    let mut system = System::with_resources([(key.clone(), Resource::Int(7))]);
    system.register(
        "x",
        Task::single(key.clone(), |_| panic!("producer must not run for a seeded key")),
    )?;

    assert_eq!(system.int(&key)?, 7);
    assert_eq!(system.invocations(), 0);
    assert!(!system.seed(key.clone(), Resource::Int(8)));
    assert_eq!(system.int(&key)?, 7);

    Ok(())
}

#[test]
fn built_resources_are_never_overwritten() -> TestResult {
    init_tracing();

    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let mut system = System::new();
    system.register(
        "tick",
        Task::single(ResourceKey::new("tick"), move |_| {
            Ok(Resource::Int(c.fetch_add(1, Ordering::SeqCst) as i64))
        }),
    )?;

    system.build("tick")?;
    let second = system.build("tick")?;

    assert_eq!(second[0].as_int(), Some(1));
    assert_eq!(system.int(&ResourceKey::new("tick"))?, 0);

    Ok(())
}

#[test]
fn structural_keys_do_not_collide() -> TestResult {
    init_tracing();

    let mut system = System::with_resources([
        (ResourceKey::new("a").int(1), Resource::from("int part")),
        (ResourceKey::new("a").str("1"), Resource::from("str part")),
    ]);

    assert_eq!(system.string(&ResourceKey::new("a").int(1))?, "int part");
    assert_eq!(system.string(&ResourceKey::new("a").str("1"))?, "str part");

    let key = ResourceKey::new("dist").int(3).str("x");
    assert_eq!(key.namespace(), "dist");
    assert_eq!(key.parts().to_vec(), vec![KeyPart::Int(3), KeyPart::Str("x".to_string())]);
    assert_eq!(key.to_string(), "dist(3,x)");
    assert_eq!(ResourceKey::task("build").namespace(), "task");

    Ok(())
}

#[test]
fn dependency_cycle_is_reported() {
    init_tracing();

    let mut system = System::new();
    system
        .register(
            "ping",
            Task::single(ResourceKey::new("ping"), |fetch| {
                fetch.fetch(&ResourceKey::new("pong"))?;
                Ok(Resource::Int(0))
            }),
        )
        .unwrap();
    system
        .register(
            "pong",
            Task::single(ResourceKey::new("pong"), |fetch| {
                fetch.fetch(&ResourceKey::new("ping"))?;
                Ok(Resource::Int(0))
            }),
        )
        .unwrap();

    let err = system.build("ping").unwrap_err();

    let mut cause: Option<&(dyn Error + 'static)> = Some(&err);
    let mut found = None;
    while let Some(e) = cause {
        if let Some(GraphError::CycleDetected { chain, .. }) = e.downcast_ref::<GraphError>() {
            found = Some(chain.clone());
        }
        cause = e.source();
    }

    let chain = found.expect("a CycleDetected error in the chain");
    assert!(chain.starts_with("ping -> pong -> ping"), "chain was {chain}");
    assert_eq!(system.resource_count(), 0);
}

#[test]
fn wrong_output_count_is_rejected() {
    init_tracing();

    let mut system = System::new();
    system
        .register(
            "pair",
            Task::new(
                vec![ResourceKey::new("left"), ResourceKey::new("right")],
                |_| Ok(vec![Resource::Int(1)]),
            ),
        )
        .unwrap();

    let err = system.build("pair").unwrap_err();
    assert!(matches!(
        err,
        GraphError::OutputMismatch { expected: 2, got: 1, .. }
    ));
    assert!(system.resource(&ResourceKey::new("left")).is_none());
}

#[test]
fn typed_fetch_reports_kind_mismatch() {
    init_tracing();

    let key = ResourceKey::new("name");
    let mut system = System::with_resources([(key.clone(), Resource::from("mk"))]);

    let err = system.int(&key).unwrap_err();
    assert_eq!(err.to_string(), "resource name is string, expected integer");
}

#[test]
fn registration_rejects_duplicates() {
    init_tracing();

    let mut system = System::new();
    system
        .register("a", Task::single(ResourceKey::new("k"), |_| Ok(Resource::Int(1))))
        .unwrap();

    let dup_name = system
        .register("a", Task::single(ResourceKey::new("other"), |_| Ok(Resource::Int(1))))
        .unwrap_err();
    assert!(matches!(dup_name, GraphError::DuplicateTask(_)));

    let dup_key = system
        .register("b", Task::single(ResourceKey::new("k"), |_| Ok(Resource::Int(1))))
        .unwrap_err();
    assert!(matches!(dup_key, GraphError::DuplicateProducer { .. }));

    let empty = system
        .register("c", Task::new(vec![], |_| Ok(vec![])))
        .unwrap_err();
    assert!(matches!(empty, GraphError::InvalidTask { .. }));
}

#[test]
fn failing_action_names_the_innermost_task() {
    init_tracing();

    let mut system = System::new();
    system
        .register(
            "leaf",
            Task::single(ResourceKey::new("leaf"), |_| anyhow::bail!("disk on fire")),
        )
        .unwrap();
    system
        .register(
            "root",
            Task::single(ResourceKey::new("root"), |fetch| {
                fetch.fetch(&ResourceKey::new("leaf"))?;
                Ok(Resource::Int(0))
            }),
        )
        .unwrap();

    let err = system.build("root").unwrap_err();
    assert_eq!(err.failed_task(), Some("leaf"));
    assert_eq!(err.to_string(), "build \"root\"");
}

#[derive(Debug, PartialEq)]
struct Toolchain {
    target: &'static str,
    jobs: u32,
}

fn typed_system() -> System {
    let mut system = System::with_resources([
        (
            ResourceKey::new("pkg").str("curl"),
            Resource::Package(Package {
                manager: "apt".to_string(),
                name: "curl".to_string(),
                version: "8.5.0".to_string(),
            }),
        ),
        (ResourceKey::file("app"), Resource::from(PathBuf::from("out/app"))),
        (
            ResourceKey::new("toolchain"),
            Resource::opaque(Toolchain {
                target: "x86_64-unknown-linux-gnu",
                jobs: 8,
            }),
        ),
    ]);
    system
        .register(
            "summary",
            Task::single(ResourceKey::new("summary"), |fetch| {
                let pkg = fetch.package(&ResourceKey::new("pkg").str("curl"))?;
                let app = fetch.path(&ResourceKey::file("app"))?;
                let toolchain = fetch.fetch(&ResourceKey::new("toolchain"))?;
                let jobs = toolchain
                    .downcast_opaque::<Toolchain>()
                    .map(|t| t.jobs)
                    .ok_or_else(|| anyhow::anyhow!("toolchain has the wrong type"))?;
                Ok(Resource::from(format!(
                    "{}={} {} -j{jobs}",
                    pkg.name,
                    pkg.version,
                    app.display()
                )))
            }),
        )
        .unwrap();
    system
}

#[test]
fn typed_accessors_read_every_resource_kind() -> TestResult {
    init_tracing();

    let mut system = typed_system();

    let pkg = system.package(&ResourceKey::new("pkg").str("curl"))?;
    assert_eq!(pkg.manager, "apt");
    assert_eq!(pkg.version, "8.5.0");

    assert_eq!(system.path(&ResourceKey::file("app"))?, Path::new("out/app"));

    let toolchain = system.fetch(&ResourceKey::new("toolchain"))?;
    assert_eq!(
        toolchain.downcast_opaque::<Toolchain>(),
        Some(&Toolchain {
            target: "x86_64-unknown-linux-gnu",
            jobs: 8,
        })
    );
    assert!(toolchain.downcast_opaque::<String>().is_none());

    assert_eq!(
        system.string(&ResourceKey::new("summary"))?,
        "curl=8.5.0 out/app -j8"
    );
    assert_eq!(system.invocations(), 1);

    Ok(())
}

#[test]
fn wrong_accessor_is_a_kind_mismatch() {
    init_tracing();

    let mut system = typed_system();
    let pkg = ResourceKey::new("pkg").str("curl");
    let app = ResourceKey::file("app");
    let toolchain = ResourceKey::new("toolchain");

    let cases = [
        (system.int(&pkg).unwrap_err(), "resource pkg(curl) is package, expected integer"),
        (system.package(&app).unwrap_err(), "resource file(app) is file, expected package"),
        (system.path(&pkg).unwrap_err(), "resource pkg(curl) is package, expected file"),
        (
            system.string(&toolchain).unwrap_err(),
            "resource toolchain is opaque value, expected string",
        ),
        (
            system.task_result(&app).unwrap_err(),
            "resource file(app) is file, expected task result",
        ),
    ];

    for (err, message) in cases {
        assert!(matches!(err, GraphError::KindMismatch { .. }), "{err:?}");
        assert_eq!(err.to_string(), message);
    }
    assert!(system.fetch(&app).is_ok_and(|r| r.downcast_opaque::<Toolchain>().is_none()));
    assert_eq!(system.invocations(), 0);
}

#[test]
fn deep_dependency_chain_fits_a_small_stack() -> TestResult {
    init_tracing();

    const DEPTH: i64 = 5000;

    let result = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let mut system = System::with_resources([(ResourceKey::new("step").int(0), Resource::Int(0))]);
            for n in 1..=DEPTH {
                system.register(
                    format!("step{n}"),
                    Task::single(ResourceKey::new("step").int(n), move |fetch| {
                        Ok(Resource::Int(fetch.int(&ResourceKey::new("step").int(n - 1))? + 1))
                    }),
                )?;
            }
            let last = system.int(&ResourceKey::new("step").int(DEPTH))?;
            Ok::<_, GraphError>((last, system.invocations()))
        })?
        .join()
        .expect("chain thread panicked");

    assert_eq!(result?, (DEPTH, DEPTH as usize));

    Ok(())
}
