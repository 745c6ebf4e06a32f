// End-to-end coordinator runs against the scripted build action.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{coordinator, names, options};
use pkgmake::engine::{CancelSignal, PackageOutcome, RunOptions};
use pkgmake::errors::PkgmakeError;
use pkgmake::flags::PackageState;
use pkgmake::fs::FileSystem;
use pkgmake::queue::StopReason;
use pkgmake::types::Phase;
use pkgmake_test_utils::{init_tracing, with_timeout, InMemoryMetadata, ScriptedBuildAction};

#[test]
fn closure_lists_dependencies_before_dependents() {
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let coord = coordinator(graph, fs, Arc::new(ScriptedBuildAction::new()), options(1));

    let closure = coord.expand_closure(&names(&["a"])).unwrap();
    assert_eq!(closure, names(&["e", "f", "d", "c", "b", "a"]));

    let closure = coord.expand_closure(&names(&["d", "c"])).unwrap();
    assert_eq!(closure, names(&["e", "f", "d", "c"]));
}

#[test]
fn unknown_package_fails_fast() {
    let graph = InMemoryMetadata::new().package("app", &["ghost"]);
    let fs = graph.mock_fs();
    let coord = coordinator(graph, fs, Arc::new(ScriptedBuildAction::new()), options(1));

    match coord.expand_closure(&names(&["app"])) {
        Err(PkgmakeError::UnresolvableDependency {
            package,
            required_by,
        }) => {
            assert_eq!(package, "ghost");
            assert_eq!(required_by, "app");
        }
        other => panic!("expected UnresolvableDependency, got {other:?}"),
    }
}

#[tokio::test]
async fn best_effort_drops_unknown_packages() {
    init_tracing();
    let graph = InMemoryMetadata::new()
        .package("lib", &[])
        .package("app", &["lib", "ghost"]);
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new());
    let coord = coordinator(
        graph,
        fs,
        Arc::clone(&action),
        RunOptions {
            best_effort: true,
            ..options(2)
        },
    );

    let report = with_timeout(coord.run(&names(&["app", "nowhere"]))).await.unwrap();

    assert!(report.succeeded());
    let build = report.phase(Phase::Build).unwrap();
    assert_eq!(build.results.len(), 2);
    assert_eq!(build.outcome("app"), Some(PackageOutcome::Built));
    assert!(action.finished_before_started("lib", "app"));
}

#[tokio::test]
async fn clean_build_and_test_phases_run_in_order() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new());
    let coord = coordinator(
        graph,
        fs,
        Arc::clone(&action),
        RunOptions {
            pre_clean: true,
            test: true,
            ..options(2)
        },
    );

    let report = with_timeout(coord.run(&names(&["c"]))).await.unwrap();

    assert!(report.succeeded());
    let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(phases, vec![Phase::Clean, Phase::Build, Phase::Test]);

    assert_eq!(action.dispatched_in(Phase::Clean).len(), 4);
    assert_eq!(action.dispatched_in(Phase::Build).len(), 4);
    assert_eq!(action.dispatched_in(Phase::Test), names(&["c"]));

    // Phases never interleave.
    let requests = action.requests();
    let last_clean = requests.iter().rposition(|r| r.phase == Phase::Clean).unwrap();
    let first_build = requests.iter().position(|r| r.phase == Phase::Build).unwrap();
    assert!(last_clean < first_build);
}

#[tokio::test]
async fn test_phase_is_not_gated_by_build_failures() {
    init_tracing();
    let graph = InMemoryMetadata::new()
        .package("lib", &[])
        .package("app", &["lib"]);
    let fs = graph.mock_fs();
    let action = Arc::new(
        ScriptedBuildAction::new()
            .respond_in("lib", Phase::Build, 2, "compile error\n")
            .respond_in("lib", Phase::Test, 2, "assertion failed\n"),
    );
    let coord = coordinator(
        graph,
        fs,
        Arc::clone(&action),
        RunOptions {
            test: true,
            ..options(1)
        },
    );

    let report = with_timeout(coord.run(&names(&["lib", "app"]))).await.unwrap();

    let build = report.phase(Phase::Build).unwrap();
    assert_eq!(build.outcome("lib"), Some(PackageOutcome::Failed));
    assert_eq!(build.outcome("app"), Some(PackageOutcome::NotAttempted));
    assert_eq!(build.stopped, Some(StopReason::Failure));

    let test = report.phase(Phase::Test).unwrap();
    assert_eq!(test.outcome("lib"), Some(PackageOutcome::Failed));
    assert_eq!(test.outcome("app"), Some(PackageOutcome::Built));
    assert!(!report.succeeded());

    let summary = report.render_summary();
    assert!(summary.contains("compile error"));
    assert!(summary.contains("assertion failed"));
}

#[tokio::test]
async fn test_target_without_rule_is_a_skip() {
    init_tracing();
    let graph = InMemoryMetadata::new().package("lib", &[]);
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new().respond_in(
        "lib",
        Phase::Test,
        2,
        "make: *** No rule to make target 'test'.  Stop.\n",
    ));
    let coord = coordinator(
        graph,
        fs,
        action,
        RunOptions {
            test: true,
            ..options(1)
        },
    );

    let report = with_timeout(coord.run(&names(&["lib"]))).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(
        report.phase(Phase::Test).unwrap().outcome("lib"),
        Some(PackageOutcome::Skipped)
    );
}

#[tokio::test]
async fn cycles_are_reported_not_attempted_instead_of_hanging() {
    init_tracing();
    let graph = InMemoryMetadata::new()
        .package("x", &["y"])
        .package("y", &["x"])
        .package("z", &["x"])
        .package("free", &[]);
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new());
    let coord = coordinator(graph, fs, Arc::clone(&action), options(2));

    let report = with_timeout(coord.run(&names(&["z", "free"]))).await.unwrap();

    let build = report.phase(Phase::Build).unwrap();
    assert_eq!(build.outcome("free"), Some(PackageOutcome::Built));
    for pkg in ["x", "y", "z"] {
        assert_eq!(build.outcome(pkg), Some(PackageOutcome::NotAttempted), "{pkg}");
    }
    assert!(build.result("x").unwrap().reason.as_deref().unwrap().contains("cycle"));
    assert_eq!(action.dispatched(), names(&["free"]));
    assert!(!report.succeeded());
}

#[tokio::test]
async fn test_phase_rejects_cycle_through_untested_packages() {
    init_tracing();
    let graph = InMemoryMetadata::new()
        .package("a", &["x"])
        .package("x", &["b"])
        .package("b", &["y"])
        .package("y", &["a"]);
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new());
    let coord = coordinator(
        graph,
        fs,
        Arc::clone(&action),
        RunOptions {
            build: false,
            test: true,
            ..options(2)
        },
    );

    let report = with_timeout(coord.run(&names(&["a", "b"]))).await.unwrap();

    let test = report.phase(Phase::Test).unwrap();
    for pkg in ["a", "b"] {
        assert_eq!(test.outcome(pkg), Some(PackageOutcome::NotAttempted), "{pkg}");
        let reason = test.result(pkg).unwrap().reason.clone().unwrap();
        assert!(reason.contains("dependency cycle"), "{pkg}: {reason}");
    }
    assert_eq!(test.stopped, None);
    assert!(action.dispatched().is_empty());
    assert!(!report.succeeded());
}

#[tokio::test]
async fn cancellation_interrupts_in_flight_and_reports_the_rest() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let cancel = CancelSignal::new();
    let action = Arc::new(
        ScriptedBuildAction::new()
            .delay("d", Duration::from_secs(30))
            .with_cancel(cancel.clone()),
    );
    let coord = coordinator(
        graph,
        fs,
        Arc::clone(&action),
        RunOptions {
            test: true,
            ..options(2)
        },
    )
    .with_cancel(cancel.clone());

    let canceller = {
        let cancel = cancel.clone();
        let action = Arc::clone(&action);
        async move {
            while !action.dispatched().contains(&"d".to_string()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        }
    };

    let targets = names(&["a"]);
    let (report, ()) = with_timeout(async { tokio::join!(coord.run(&targets), canceller) }).await;
    let report = report.unwrap();

    let build = report.phase(Phase::Build).unwrap();
    assert_eq!(build.stopped, Some(StopReason::Cancelled));
    assert_eq!(build.outcome("d"), Some(PackageOutcome::Interrupted));
    for pkg in ["c", "b", "a"] {
        assert_eq!(build.outcome(pkg), Some(PackageOutcome::NotAttempted));
    }

    let test = report.phase(Phase::Test).unwrap();
    assert_eq!(test.outcome("a"), Some(PackageOutcome::NotAttempted));
    assert!(!report.succeeded());
}

#[tokio::test]
async fn build_entry_point_reports_overall_success() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let coord = coordinator(
        graph.clone(),
        fs.clone(),
        Arc::new(ScriptedBuildAction::new()),
        options(1),
    );
    assert!(with_timeout(coord.build(&names(&["a"]), Phase::Build, 3, false)).await);

    let failing = coordinator(graph, fs, Arc::new(ScriptedBuildAction::new().fail("e")), options(1));
    assert!(!with_timeout(failing.build(&names(&["a"]), Phase::Build, 2, true)).await);
    assert!(!with_timeout(failing.build(&names(&["nope"]), Phase::Build, 2, false)).await);
}

#[test]
fn mark_and_unmark_installed_over_closure() {
    let graph = InMemoryMetadata::new()
        .package("lib", &[])
        .package("app", &["lib"]);
    let fs = graph.mock_fs();
    let coord = coordinator(graph, fs.clone(), Arc::new(ScriptedBuildAction::new()), options(1));

    let marked = coord.mark_installed(&names(&["app"])).unwrap();
    assert_eq!(marked, names(&["lib", "app"]));
    for pkg in ["lib", "app"] {
        assert!(fs.is_file(&InMemoryMetadata::dir_of(pkg).join("NOBUILD")));
        assert_eq!(coord.flags().state(pkg), PackageState::PreInstalled);
    }

    coord.unmark_installed(&names(&["app"])).unwrap();
    for pkg in ["lib", "app"] {
        assert!(!fs.is_file(&InMemoryMetadata::dir_of(pkg).join("NOBUILD")));
        assert_eq!(coord.flags().state(pkg), PackageState::Normal);
    }
}

#[test]
fn dry_run_plan_classifies_without_building() {
    let graph = InMemoryMetadata::new()
        .package("lib", &[])
        .package("old", &[])
        .package("app", &["lib", "old"]);
    let fs = graph.mock_fs();
    fs.add_file(InMemoryMetadata::dir_of("old").join("NOBUILD"), "");
    let action = Arc::new(ScriptedBuildAction::new());
    let coord = coordinator(graph, fs, Arc::clone(&action), options(3));

    let plan = coord.plan(&names(&["app"])).unwrap();

    assert_eq!(plan.phases, vec![Phase::Build]);
    assert_eq!(
        plan.closure,
        vec![
            ("lib".to_string(), PackageState::Normal),
            ("old".to_string(), PackageState::PreInstalled),
            ("app".to_string(), PackageState::Normal),
        ]
    );
    assert!(plan.unschedulable.is_empty());
    let text = plan.to_string();
    assert!(text.contains("old [installed]"));
    assert!(text.contains("jobs: 3"));
    assert!(action.dispatched().is_empty());
}
