// src/engine/coordinator.rs

//! Runs the clean / build / test phases over a requested package set.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::ConfigSection;
use crate::deps::{precheck, DependencyTracker};
use crate::engine::cancel::CancelSignal;
use crate::engine::report::{BuildReport, PackageResult, PhaseReport};
use crate::errors::{PkgmakeError, Result};
use crate::exec::{spawn_workers, BuildAction, GatePolicy, OutputClassifier, WorkerContext};
use crate::flags::{MarkerStore, PackageFlagTracker, PackageState};
use crate::metadata::{MetadataError, PackageMetadataProvider};
use crate::queue::{BuildQueue, QueueState, QueueStatus, StopReason};
use crate::types::{PackageName, Phase};

/// Knobs for one coordinator, usually taken from `[config]` and then
/// overridden from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub pre_clean: bool,
    pub build: bool,
    pub test: bool,
    /// Worker count; always at least one.
    pub jobs: usize,
    pub robust: bool,
    pub best_effort: bool,
    pub use_blacklist: bool,
    pub require_build_descriptor: bool,
    pub tick: Duration,
    pub starvation_limit: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pre_clean: false,
            build: true,
            test: false,
            jobs: 1,
            robust: false,
            best_effort: false,
            use_blacklist: true,
            require_build_descriptor: true,
            tick: BuildQueue::DEFAULT_TICK,
            starvation_limit: QueueState::DEFAULT_STARVATION_LIMIT,
        }
    }
}

impl RunOptions {
    pub fn from_config(cfg: &ConfigSection) -> Self {
        Self {
            jobs: cfg.effective_jobs(),
            robust: cfg.robust,
            best_effort: cfg.best_effort,
            use_blacklist: cfg.use_blacklist,
            require_build_descriptor: cfg.require_build_descriptor,
            tick: Duration::from_millis(cfg.tick_ms),
            starvation_limit: cfg.starvation_limit,
            ..Self::default()
        }
    }

    /// Phases to run, in order.
    pub fn phases(&self) -> Vec<Phase> {
        let mut phases = Vec::new();
        if self.pre_clean {
            phases.push(Phase::Clean);
        }
        if self.build {
            phases.push(Phase::Build);
        }
        if self.test {
            phases.push(Phase::Test);
        }
        phases
    }
}

/// What a run would do, without doing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunPlan {
    pub phases: Vec<Phase>,
    /// Closure in dependency-first order with each package's classification.
    pub closure: Vec<(PackageName, PackageState)>,
    /// Packages the build phase would refuse to enqueue, with the reason.
    pub unschedulable: Vec<(PackageName, String)>,
    pub jobs: usize,
    pub robust: bool,
}

impl fmt::Display for DryRunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pkgmake dry-run")?;
        let phases: Vec<&str> = self.phases.iter().map(|p| p.as_str()).collect();
        writeln!(f, "  phases: {}", phases.join(", "))?;
        writeln!(f, "  jobs: {}", self.jobs)?;
        writeln!(f, "  robust: {}", self.robust)?;
        writeln!(f)?;
        writeln!(f, "packages ({}):", self.closure.len())?;
        for (pkg, state) in &self.closure {
            writeln!(f, "  - {pkg} [{state}]")?;
        }
        if !self.unschedulable.is_empty() {
            writeln!(f)?;
            writeln!(f, "never scheduled ({}):", self.unschedulable.len())?;
            for (pkg, reason) in &self.unschedulable {
                writeln!(f, "  - {pkg}: {reason}")?;
            }
        }
        Ok(())
    }
}

pub struct BuildCoordinator {
    provider: Arc<dyn PackageMetadataProvider>,
    deps: Arc<DependencyTracker>,
    flags: Arc<PackageFlagTracker>,
    action: Arc<dyn BuildAction>,
    classifier: Arc<OutputClassifier>,
    cancel: CancelSignal,
    options: RunOptions,
}

impl fmt::Debug for BuildCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCoordinator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BuildCoordinator {
    pub fn new(
        provider: Arc<dyn PackageMetadataProvider>,
        markers: Arc<dyn MarkerStore>,
        action: Arc<dyn BuildAction>,
        classifier: OutputClassifier,
        options: RunOptions,
    ) -> Self {
        let deps = Arc::new(DependencyTracker::for_all_packages(Arc::clone(&provider)));
        let flags = Arc::new(PackageFlagTracker::new(Arc::clone(&deps), markers));
        Self {
            provider,
            deps,
            flags,
            action,
            classifier: Arc::new(classifier),
            cancel: CancelSignal::new(),
            options,
        }
    }

    /// Share `signal` with whoever raises cancellation (Ctrl-C handler,
    /// the build action).
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn flags(&self) -> &Arc<PackageFlagTracker> {
        &self.flags
    }

    pub fn dependencies(&self) -> &Arc<DependencyTracker> {
        &self.deps
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Requested packages plus everything they depend on, each package
    /// after its dependencies.
    ///
    /// An unknown package fails the whole expansion, unless best-effort
    /// mode is on, in which case it is dropped with a warning.
    pub fn expand_closure(&self, requested: &[PackageName]) -> Result<Vec<PackageName>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for pkg in requested {
            self.visit(pkg, None, &mut seen, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        pkg: &str,
        required_by: Option<&str>,
        seen: &mut HashSet<PackageName>,
        order: &mut Vec<PackageName>,
    ) -> Result<()> {
        if !seen.insert(pkg.to_string()) {
            return Ok(());
        }

        let deps = match self.provider.direct_dependencies(pkg) {
            Ok(deps) => deps,
            Err(MetadataError::NotFound(_)) => {
                let required_by = required_by.unwrap_or("command line").to_string();
                if self.options.best_effort {
                    warn!(package = %pkg, %required_by, "cannot locate package; dropping it");
                    return Ok(());
                }
                return Err(PkgmakeError::UnresolvableDependency {
                    package: pkg.to_string(),
                    required_by,
                });
            }
        };

        for dep in &deps {
            self.visit(dep, Some(pkg), seen, order)?;
        }
        order.push(pkg.to_string());
        Ok(())
    }

    /// Run every configured phase over `requested` and its closure.
    ///
    /// Only resolution errors are returned as `Err`; build failures end up
    /// in the report.
    pub async fn run(&self, requested: &[PackageName]) -> Result<BuildReport> {
        let closure = self.expand_closure(requested)?;
        let in_closure: HashSet<&str> = closure.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let targets: Vec<PackageName> = requested
            .iter()
            .filter(|p| in_closure.contains(p.as_str()) && seen.insert(p.as_str()))
            .cloned()
            .collect();

        info!(
            requested = targets.len(),
            closure = closure.len(),
            jobs = self.options.jobs,
            robust = self.options.robust,
            "resolved build closure"
        );

        let mut report = BuildReport::default();
        for phase in self.options.phases() {
            let phase_report = match phase {
                Phase::Clean | Phase::Build => {
                    self.run_phase(
                        phase,
                        closure.clone(),
                        &self.deps,
                        self.options.robust,
                        self.options.jobs,
                    )
                    .await
                }
                // Tests cover only what was asked for, ordered among
                // themselves, and every test is attempted.
                Phase::Test => {
                    let tracker = self.deps.with_valid_set(targets.clone());
                    self.run_phase(phase, targets.clone(), &tracker, true, self.options.jobs)
                        .await
                }
            };
            report.phases.push(phase_report);
        }
        Ok(report)
    }

    /// Core entry point: run one phase over `selected` and report whether
    /// every package succeeded.
    ///
    /// Clean and build phases cover the dependency closure; the test phase
    /// covers `selected` only.
    pub async fn build(
        &self,
        selected: &[PackageName],
        phase: Phase,
        worker_count: usize,
        robust: bool,
    ) -> bool {
        let report = match phase {
            Phase::Test => {
                let tracker = self.deps.with_valid_set(selected.iter().cloned());
                self.run_phase(phase, selected.to_vec(), &tracker, true, worker_count)
                    .await
            }
            Phase::Clean | Phase::Build => match self.expand_closure(selected) {
                Ok(closure) => {
                    self.run_phase(phase, closure, &self.deps, robust, worker_count)
                        .await
                }
                Err(e) => {
                    error!(error = %e, "cannot resolve packages");
                    return false;
                }
            },
        };
        report.succeeded()
    }

    /// Write no-build markers for the closure of `requested`.
    pub fn mark_installed(&self, requested: &[PackageName]) -> Result<Vec<PackageName>> {
        let closure = self.expand_closure(requested)?;
        for pkg in &closure {
            self.flags.add_nobuild(pkg)?;
        }
        Ok(closure)
    }

    /// Remove no-build markers from the closure of `requested`.
    pub fn unmark_installed(&self, requested: &[PackageName]) -> Result<Vec<PackageName>> {
        let closure = self.expand_closure(requested)?;
        for pkg in &closure {
            self.flags.remove_nobuild(pkg)?;
        }
        Ok(closure)
    }

    pub fn plan(&self, requested: &[PackageName]) -> Result<DryRunPlan> {
        let closure = self.expand_closure(requested)?;
        let unschedulable = precheck(&closure, &self.deps)
            .unschedulable
            .into_iter()
            .map(|u| (u.package, u.reason.to_string()))
            .collect();
        let closure = closure
            .into_iter()
            .map(|pkg| {
                let state = self.flags.state(&pkg);
                (pkg, state)
            })
            .collect();

        Ok(DryRunPlan {
            phases: self.options.phases(),
            closure,
            unschedulable,
            jobs: self.options.jobs,
            robust: self.options.robust,
        })
    }

    async fn run_phase(
        &self,
        phase: Phase,
        packages: Vec<PackageName>,
        tracker: &DependencyTracker,
        robust: bool,
        jobs: usize,
    ) -> PhaseReport {
        let started = Instant::now();
        let mut report = PhaseReport::new(phase);

        if self.cancel.is_cancelled() {
            info!(%phase, "cancelled before phase started");
            report.results = packages
                .into_iter()
                .map(|pkg| PackageResult::not_attempted(pkg, phase, "cancelled before phase started"))
                .collect();
            report.stopped = Some(StopReason::Cancelled);
            return report;
        }

        let plan = precheck(&packages, tracker);
        for u in plan.unschedulable {
            warn!(package = %u.package, %phase, reason = %u.reason, "package will not be scheduled");
            report
                .results
                .push(PackageResult::not_attempted(u.package, phase, u.reason.to_string()));
        }

        info!(%phase, packages = plan.schedulable.len(), jobs, robust, "starting phase");

        let queue = Arc::new(
            BuildQueue::new(plan.schedulable, tracker, robust)
                .with_timing(self.options.tick, self.options.starvation_limit),
        );

        let (tx, mut rx) = mpsc::channel::<PackageResult>(64);
        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            action: Arc::clone(&self.action),
            flags: Arc::clone(&self.flags),
            provider: Arc::clone(&self.provider),
            classifier: Arc::clone(&self.classifier),
            phase,
            policy: GatePolicy {
                use_blacklist: self.options.use_blacklist,
                require_build_descriptor: self.options.require_build_descriptor,
                gate_failed_ancestors: !robust && phase != Phase::Test,
            },
            results: tx,
        };
        let handles = spawn_workers(jobs, ctx);

        let watcher = {
            let queue = Arc::clone(&queue);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                queue.stop(StopReason::Cancelled);
            })
        };

        // Every sender lives in a worker, so this ends once they all exit.
        while let Some(result) = rx.recv().await {
            report.results.push(result);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(%phase, error = %e, "worker task ended abnormally");
            }
        }
        watcher.abort();

        let snapshot = queue.snapshot();
        let leftover_reason = match snapshot.status {
            QueueStatus::Stopped(reason) => reason.to_string(),
            QueueStatus::Running | QueueStatus::Completed => "never dispatched".to_string(),
        };
        for pkg in snapshot.to_build {
            report
                .results
                .push(PackageResult::not_attempted(pkg, phase, leftover_reason.clone()));
        }
        // Only a worker that died mid-build leaves a package in flight.
        for pkg in snapshot.started {
            report
                .results
                .push(PackageResult::not_attempted(pkg, phase, "worker ended before reporting"));
        }

        if let QueueStatus::Stopped(reason) = snapshot.status {
            report.stopped = Some(reason);
        }
        report.elapsed = started.elapsed();

        info!(
            %phase,
            built = snapshot.built.len(),
            failed = snapshot.failed.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            succeeded = report.succeeded(),
            "phase finished"
        );
        report
    }
}
