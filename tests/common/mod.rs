#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pkgmake::config::{ConfigSection, MarkerSection};
use pkgmake::deps::DependencyTracker;
use pkgmake::engine::{BuildCoordinator, PackageResult, RunOptions};
use pkgmake::exec::{spawn_workers, GatePolicy, OutputClassifier, WorkerContext};
use pkgmake::flags::{FsMarkerStore, PackageFlagTracker};
use pkgmake::fs::mock::MockFileSystem;
use pkgmake::metadata::PackageMetadataProvider;
use pkgmake::queue::{BuildQueue, QueueSnapshot};
use pkgmake::types::{PackageName, Phase};
use pkgmake_test_utils::{InMemoryMetadata, ScriptedBuildAction};
use tokio::sync::mpsc;

pub const TICK: Duration = Duration::from_millis(20);

pub fn names(pkgs: &[&str]) -> Vec<PackageName> {
    pkgs.iter().map(|s| s.to_string()).collect()
}

pub fn classifier() -> OutputClassifier {
    OutputClassifier::from_config(&ConfigSection::default()).unwrap()
}

pub fn marker_store(
    provider: Arc<dyn PackageMetadataProvider>,
    fs: Arc<MockFileSystem>,
) -> Arc<FsMarkerStore> {
    Arc::new(FsMarkerStore::new(fs, provider, MarkerSection::default()))
}

/// Outcome of driving one queue to the end with real workers.
pub struct QueueRun {
    pub snapshot: QueueSnapshot,
    pub succeeded: bool,
    pub results: Vec<PackageResult>,
}

/// Enqueue `order` (insertion order matters), run `workers` workers
/// against `action` until every worker exits.
pub async fn run_queue(
    graph: InMemoryMetadata,
    fs: MockFileSystem,
    order: &[&str],
    action: Arc<ScriptedBuildAction>,
    workers: usize,
    robust: bool,
) -> QueueRun {
    let provider: Arc<dyn PackageMetadataProvider> = Arc::new(graph);
    let deps = Arc::new(DependencyTracker::for_all_packages(Arc::clone(&provider)));
    let flags = Arc::new(PackageFlagTracker::new(
        Arc::clone(&deps),
        marker_store(Arc::clone(&provider), Arc::new(fs)),
    ));
    let queue = Arc::new(BuildQueue::new(names(order), &deps, robust).with_timing(TICK, 3));

    let (tx, mut rx) = mpsc::channel(64);
    let ctx = WorkerContext {
        queue: Arc::clone(&queue),
        action,
        flags,
        provider,
        classifier: Arc::new(classifier()),
        phase: Phase::Build,
        policy: GatePolicy {
            gate_failed_ancestors: !robust,
            ..GatePolicy::default()
        },
        results: tx,
    };

    let handles = spawn_workers(workers, ctx);
    let mut results = Vec::new();
    pkgmake_test_utils::with_timeout(async {
        while let Some(r) = rx.recv().await {
            results.push(r);
        }
        for h in handles {
            h.await.unwrap();
        }
    })
    .await;

    QueueRun {
        snapshot: queue.snapshot(),
        succeeded: queue.succeeded(),
        results,
    }
}

pub fn options(jobs: usize) -> RunOptions {
    RunOptions {
        jobs,
        tick: TICK,
        ..RunOptions::default()
    }
}

/// Coordinator over an in-memory graph whose packages all have a
/// descriptor (plus whatever extra markers `fs` carries).
pub fn coordinator(
    graph: InMemoryMetadata,
    fs: MockFileSystem,
    action: Arc<ScriptedBuildAction>,
    options: RunOptions,
) -> BuildCoordinator {
    let provider: Arc<dyn PackageMetadataProvider> = Arc::new(graph);
    let markers = marker_store(Arc::clone(&provider), Arc::new(fs));
    BuildCoordinator::new(provider, markers, action, classifier(), options)
}
