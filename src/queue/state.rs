// src/queue/state.rs

//! Pure queue state machine.
//!
//! No locks, no async, no clock of its own: callers pass `Instant`s in.
//! This keeps every scheduling decision unit-testable in isolation.
//!
//! Invariant: every enqueued package is in exactly one of `to_build`,
//! `started`, `built` or `failed`, and the four sizes always sum to
//! `total`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::deps::DependencyTracker;
use crate::types::PackageName;

/// Why a queue stopped before every package finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A package failed in a non-robust queue.
    Failure,
    /// External cancellation.
    Cancelled,
    /// No package became buildable while nothing was running.
    Starved,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Failure => "stopped after failure",
            StopReason::Cancelled => "cancelled",
            StopReason::Starved => "no package became buildable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Running,
    /// Every enqueued package ended in `built` or `failed`.
    Completed,
    Stopped(StopReason),
}

/// Result of one dispatch scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// This package moved to `started` and belongs to the caller now.
    Package(PackageName),
    /// Nothing is ready yet; wait and scan again.
    Wait,
    /// No further work will be handed out.
    Finished,
}

/// Point-in-time view used for progress lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// In-flight packages with their elapsed time, by name.
    pub active: Vec<(PackageName, Duration)>,
    pub built: usize,
    pub failed: usize,
    pub pending: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ {} Active {}/{} Complete ]",
            self.active.len(),
            self.built,
            self.total
        )
    }
}

/// Final (or current) membership of the four collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub to_build: Vec<PackageName>,
    pub started: Vec<PackageName>,
    pub built: Vec<PackageName>,
    pub failed: Vec<PackageName>,
    pub status: QueueStatus,
}

#[derive(Debug)]
pub struct QueueState {
    total: usize,
    to_build: Vec<PackageName>,
    started: BTreeMap<PackageName, Instant>,
    built: Vec<PackageName>,
    failed: Vec<PackageName>,
    /// Filtered dependencies, captured at construction.
    deps: HashMap<PackageName, Vec<PackageName>>,
    robust: bool,
    status: QueueStatus,
    empty_scans: u32,
    starvation_limit: u32,
}

impl QueueState {
    pub const DEFAULT_STARVATION_LIMIT: u32 = 3;

    /// Build state for `packages`, taking each package's transitive
    /// dependencies from `tracker`.
    pub fn new(packages: Vec<PackageName>, tracker: &DependencyTracker, robust: bool) -> Self {
        let deps = packages
            .iter()
            .map(|p| (p.clone(), tracker.transitive_deps(p)))
            .collect();
        Self::with_dependencies(packages, deps, robust)
    }

    /// Build state from an explicit dependency map. Packages missing from
    /// `deps` have no dependencies.
    pub fn with_dependencies(
        packages: Vec<PackageName>,
        deps: HashMap<PackageName, Vec<PackageName>>,
        robust: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        let to_build: Vec<PackageName> = packages
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();

        let status = if to_build.is_empty() {
            QueueStatus::Completed
        } else {
            QueueStatus::Running
        };

        Self {
            total: to_build.len(),
            to_build,
            started: BTreeMap::new(),
            built: Vec::new(),
            failed: Vec::new(),
            deps,
            robust,
            status,
            empty_scans: 0,
            starvation_limit: Self::DEFAULT_STARVATION_LIMIT,
        }
    }

    pub fn with_starvation_limit(mut self, limit: u32) -> Self {
        self.starvation_limit = limit.max(1);
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn robust(&self) -> bool {
        self.robust
    }

    pub fn status(&self) -> QueueStatus {
        self.status
    }

    pub fn built(&self) -> &[PackageName] {
        &self.built
    }

    pub fn failed(&self) -> &[PackageName] {
        &self.failed
    }

    pub fn active_count(&self) -> usize {
        self.started.len()
    }

    pub fn is_completed(&self) -> bool {
        self.built.len() + self.failed.len() == self.total
    }

    pub fn is_done(&self) -> bool {
        self.status != QueueStatus::Running
    }

    pub fn succeeded(&self) -> bool {
        self.built.len() == self.total
    }

    fn deps_met(&self, pkg: &str) -> bool {
        self.deps.get(pkg).is_none_or(|deps| {
            deps.iter().all(|d| {
                self.built.contains(d) || (self.robust && self.failed.contains(d))
            })
        })
    }

    /// Scan `to_build` in insertion order and claim the first package whose
    /// dependencies are all satisfied.
    pub fn try_dispatch(&mut self, now: Instant) -> Dispatch {
        if self.is_done() || self.to_build.is_empty() {
            return Dispatch::Finished;
        }

        let ready = self.to_build.iter().position(|p| self.deps_met(p));
        match ready {
            Some(idx) => {
                let pkg = self.to_build.remove(idx);
                self.started.insert(pkg.clone(), now);
                self.empty_scans = 0;
                debug!(package = %pkg, active = self.started.len(), "dispatching package");
                Dispatch::Package(pkg)
            }
            None => Dispatch::Wait,
        }
    }

    /// Account for a scan that found nothing. Returns `true` if this scan
    /// pushed the queue into `Stopped(Starved)`.
    ///
    /// Only scans made while no package is in flight count; anything in
    /// flight can still unblock the rest.
    pub fn record_empty_scan(&mut self) -> bool {
        if self.is_done() {
            return false;
        }
        if !self.started.is_empty() {
            self.empty_scans = 0;
            return false;
        }

        self.empty_scans += 1;
        if self.empty_scans >= self.starvation_limit {
            warn!(
                pending = self.to_build.len(),
                scans = self.empty_scans,
                "no package became buildable and nothing is running; giving up"
            );
            self.status = QueueStatus::Stopped(StopReason::Starved);
            return true;
        }
        false
    }

    /// Record the single outcome of a dispatched package.
    ///
    /// Returns `false` (and changes nothing) if `pkg` is not in flight.
    pub fn return_built(&mut self, pkg: &str, success: bool) -> bool {
        if self.started.remove(pkg).is_none() {
            warn!(package = %pkg, "outcome reported for a package that is not in flight; ignoring");
            return false;
        }

        if success {
            self.built.push(pkg.to_string());
        } else {
            self.failed.push(pkg.to_string());
        }

        if self.is_completed() && self.status == QueueStatus::Running {
            info!(
                built = self.built.len(),
                failed = self.failed.len(),
                "all packages accounted for"
            );
            self.status = QueueStatus::Completed;
        }
        true
    }

    /// Halt dispatch. The first reason wins; a completed queue stays
    /// completed.
    pub fn stop(&mut self, reason: StopReason) {
        if self.status == QueueStatus::Running {
            info!(%reason, "stopping queue");
            self.status = QueueStatus::Stopped(reason);
        }
    }

    pub fn progress(&self, now: Instant) -> Progress {
        Progress {
            active: self
                .started
                .iter()
                .map(|(p, t)| (p.clone(), now.saturating_duration_since(*t)))
                .collect(),
            built: self.built.len(),
            failed: self.failed.len(),
            pending: self.to_build.len(),
            total: self.total,
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            to_build: self.to_build.clone(),
            started: self.started.keys().cloned().collect(),
            built: self.built.clone(),
            failed: self.failed.clone(),
            status: self.status,
        }
    }
}
