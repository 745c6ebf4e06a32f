// src/engine/report.rs

//! Per-package, per-phase results and the text summary printed at the end
//! of a run.

use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use crate::exec::BuildOutcome;
use crate::queue::StopReason;
use crate::types::{PackageName, Phase};

/// How a single package fared in a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageOutcome {
    Built,
    /// Nothing to do, or gated out without blocking dependents.
    Skipped,
    Failed,
    Interrupted,
    /// Never dispatched (cancellation, starvation, unreachable).
    NotAttempted,
}

impl PackageOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, PackageOutcome::Built | PackageOutcome::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageOutcome::Built => "PASS",
            PackageOutcome::Skipped => "SKIP",
            PackageOutcome::Failed => "FAIL",
            PackageOutcome::Interrupted => "INTERRUPTED",
            PackageOutcome::NotAttempted => "NOT ATTEMPTED",
        }
    }
}

impl From<BuildOutcome> for PackageOutcome {
    fn from(outcome: BuildOutcome) -> Self {
        match outcome {
            BuildOutcome::Success => PackageOutcome::Built,
            BuildOutcome::Skipped => PackageOutcome::Skipped,
            BuildOutcome::Failed => PackageOutcome::Failed,
            BuildOutcome::Interrupted => PackageOutcome::Interrupted,
        }
    }
}

impl fmt::Display for PackageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    pub package: PackageName,
    pub phase: Phase,
    pub outcome: PackageOutcome,
    pub elapsed: Duration,
    /// Captured build output; empty when the action never ran.
    pub output: String,
    /// Why the package was skipped, failed early or never attempted.
    pub reason: Option<String>,
}

impl PackageResult {
    pub fn not_attempted(package: PackageName, phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            package,
            phase,
            outcome: PackageOutcome::NotAttempted,
            elapsed: Duration::ZERO,
            output: String::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Results of one phase, in completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub results: Vec<PackageResult>,
    /// Why the phase queue stopped early, if it did.
    pub stopped: Option<StopReason>,
    pub elapsed: Duration,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            results: Vec::new(),
            stopped: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.stopped.is_none() && self.results.iter().all(|r| r.outcome.is_success())
    }

    pub fn result(&self, package: &str) -> Option<&PackageResult> {
        self.results.iter().find(|r| r.package == package)
    }

    pub fn outcome(&self, package: &str) -> Option<PackageOutcome> {
        self.result(package).map(|r| r.outcome)
    }

    pub fn count(&self, outcome: PackageOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub phases: Vec<PhaseReport>,
}

impl BuildReport {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// True iff every phase that ran succeeded.
    pub fn succeeded(&self) -> bool {
        self.phases.iter().all(PhaseReport::succeeded)
    }

    /// Failed or interrupted results across all phases.
    pub fn failures(&self) -> impl Iterator<Item = &PackageResult> {
        self.phases
            .iter()
            .flat_map(|p| p.results.iter())
            .filter(|r| {
                matches!(
                    r.outcome,
                    PackageOutcome::Failed | PackageOutcome::Interrupted
                )
            })
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let width = self
            .phases
            .iter()
            .flat_map(|p| p.results.iter())
            .map(|r| r.package.len())
            .max()
            .unwrap_or(0)
            .max("package".len());

        for phase in &self.phases {
            let _ = writeln!(
                out,
                "{} phase: {} built, {} skipped, {} failed, {} interrupted, {} not attempted ({:.1}s)",
                phase.phase,
                phase.count(PackageOutcome::Built),
                phase.count(PackageOutcome::Skipped),
                phase.count(PackageOutcome::Failed),
                phase.count(PackageOutcome::Interrupted),
                phase.count(PackageOutcome::NotAttempted),
                phase.elapsed.as_secs_f64(),
            );
            if let Some(reason) = phase.stopped {
                let _ = writeln!(out, "  stopped early: {reason}");
            }
            for r in &phase.results {
                let _ = write!(
                    out,
                    "  {:<width$}  {:<13}  {:>7.2}s",
                    r.package,
                    r.outcome.as_str(),
                    r.elapsed.as_secs_f64(),
                );
                if let Some(reason) = &r.reason {
                    let _ = write!(out, "  ({reason})");
                }
                out.push('\n');
            }
        }

        let failures: Vec<&PackageResult> = self.failures().collect();
        if !failures.is_empty() {
            out.push('\n');
            for r in failures {
                let _ = writeln!(out, "--- output of {} [{}] ---", r.package, r.phase);
                out.push_str(r.output.trim_end());
                out.push('\n');
            }
        }
        out
    }
}
