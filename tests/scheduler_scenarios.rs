// Queue + worker behaviour on the six-package reference graph.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{names, run_queue};
use pkgmake::engine::PackageOutcome;
use pkgmake::queue::{QueueStatus, StopReason};
use pkgmake_test_utils::{init_tracing, InMemoryMetadata, ScriptedBuildAction};

const ORDER: &[&str] = &["f", "e", "d", "c", "b", "a"];

#[tokio::test]
async fn scenario_a_single_worker_builds_everything() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new());

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 1, false).await;

    assert!(run.succeeded);
    assert_eq!(run.snapshot.status, QueueStatus::Completed);
    assert_eq!(run.snapshot.built.len(), 6);
    assert!(run.snapshot.failed.is_empty());
    assert!(action.finished_before_started("e", "d"));
    assert!(action.finished_before_started("f", "d"));
    assert_eq!(action.max_concurrency(), 1);
}

#[tokio::test]
async fn scenario_b_two_workers_overlap_independent_roots() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new().with_delay(Duration::from_millis(50)));

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 2, false).await;

    assert!(run.succeeded);
    assert_eq!(run.snapshot.built.len(), 6);

    let first_two: Vec<String> = action.dispatched().into_iter().take(2).collect();
    assert!(first_two.contains(&"e".to_string()));
    assert!(first_two.contains(&"f".to_string()));
    assert_eq!(action.max_concurrency(), 2);

    assert!(action.finished_before_started("e", "d"));
    assert!(action.finished_before_started("f", "d"));
    for (dep, pkg) in [("d", "c"), ("c", "b"), ("b", "a")] {
        assert!(action.finished_before_started(dep, pkg), "{dep} before {pkg}");
    }
}

#[tokio::test]
async fn scenario_c_failure_stops_non_robust_queue() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new().fail("d"));

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 1, false).await;

    assert!(!run.succeeded);
    assert_eq!(run.snapshot.status, QueueStatus::Stopped(StopReason::Failure));
    assert_eq!(run.snapshot.failed, names(&["d"]));
    let mut built = run.snapshot.built.clone();
    built.sort();
    assert_eq!(built, names(&["e", "f"]));

    let dispatched = action.dispatched();
    for never in ["c", "b", "a"] {
        assert!(!dispatched.contains(&never.to_string()));
    }
    assert_eq!(run.snapshot.to_build, names(&["c", "b", "a"]));
}

#[tokio::test]
async fn scenario_d_robust_attempts_everything() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let action = Arc::new(ScriptedBuildAction::new().fail("d"));

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 1, true).await;

    assert!(!run.succeeded);
    assert_eq!(run.snapshot.status, QueueStatus::Completed);
    assert_eq!(run.snapshot.failed, names(&["d"]));
    assert_eq!(run.snapshot.built, names(&["f", "e", "c", "b", "a"]));
    assert_eq!(action.dispatched().len(), 6);
    assert_eq!(
        run.snapshot.built.len() + run.snapshot.failed.len(),
        ORDER.len()
    );
}

#[tokio::test]
async fn every_dispatched_package_reports_exactly_once() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    let action = Arc::new(
        ScriptedBuildAction::new()
            .with_delay(Duration::from_millis(5))
            .fail("c"),
    );

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 3, true).await;

    let mut reported: Vec<String> = run.results.iter().map(|r| r.package.clone()).collect();
    reported.sort();
    let mut dispatched = action.dispatched();
    dispatched.sort();
    assert_eq!(reported, dispatched);
    assert_eq!(reported.len(), 6);
}

#[tokio::test]
async fn scenario_e_nobuild_is_skipped_but_satisfies_dependents() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    fs.add_file(InMemoryMetadata::dir_of("d").join("NOBUILD"), "");
    let action = Arc::new(ScriptedBuildAction::new());

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 2, false).await;

    assert!(run.succeeded);
    assert!(!action.dispatched().contains(&"d".to_string()));
    let d = run.results.iter().find(|r| r.package == "d").unwrap();
    assert_eq!(d.outcome, PackageOutcome::Skipped);
    assert_eq!(run.snapshot.built.len(), 6);
}

#[tokio::test]
async fn scenario_e_blacklist_blocks_dependents() {
    init_tracing();
    let graph = InMemoryMetadata::chain_graph();
    let fs = graph.mock_fs();
    fs.add_file(InMemoryMetadata::dir_of("d").join("BUILD_BLACKLIST"), "");
    let action = Arc::new(ScriptedBuildAction::new());

    let run = run_queue(graph, fs, ORDER, Arc::clone(&action), 1, false).await;

    assert!(!run.succeeded);
    assert_eq!(run.snapshot.failed, names(&["d"]));
    let d = run.results.iter().find(|r| r.package == "d").unwrap();
    assert_eq!(d.outcome, PackageOutcome::Failed);
    assert!(d.reason.as_deref().unwrap().contains("blacklisted by d"));
    assert_eq!(action.dispatched(), names(&["f", "e"]));
}

#[tokio::test]
async fn missing_descriptor_is_skipped_without_running() {
    init_tracing();
    let graph = InMemoryMetadata::new().package("lib", &[]).package("app", &["lib"]);
    let fs = pkgmake::fs::mock::MockFileSystem::new();
    fs.add_file(InMemoryMetadata::dir_of("app").join("Makefile"), "all:\n");
    fs.add_dir(InMemoryMetadata::dir_of("lib"));
    let action = Arc::new(ScriptedBuildAction::new());

    let run = run_queue(graph, fs, &["lib", "app"], Arc::clone(&action), 1, false).await;

    assert!(run.succeeded);
    assert_eq!(action.dispatched(), names(&["app"]));
}
