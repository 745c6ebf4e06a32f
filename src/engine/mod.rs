// src/engine/mod.rs

//! Orchestration: phases, cancellation and the final report.
//!
//! [`BuildCoordinator`] expands the requested packages into their
//! dependency closure, runs one fresh [`crate::queue::BuildQueue`] per
//! phase with a pool of workers, and collects a [`BuildReport`].

pub mod cancel;
pub mod coordinator;
pub mod report;

pub use cancel::CancelSignal;
pub use coordinator::{BuildCoordinator, DryRunPlan, RunOptions};
pub use report::{BuildReport, PackageOutcome, PackageResult, PhaseReport};
