// src/exec/mod.rs

//! Build execution layer.
//!
//! - [`action`] defines the [`BuildAction`] seam: run one package for one
//!   phase and hand back its exit code and combined output.
//! - [`command`] is the production action, spawning the configured build
//!   tool inside the package directory.
//! - [`classify`] turns raw output into a [`BuildOutcome`].
//! - [`worker`] pulls packages from a queue, gates them through the flag
//!   tracker, runs the action and reports back.

pub mod action;
pub mod classify;
pub mod command;
pub mod worker;

pub use action::{BuildAction, BuildOutput, BuildRequest};
pub use classify::{BuildOutcome, OutputClassifier};
pub use command::CommandBuildAction;
pub use worker::{spawn_workers, GatePolicy, Worker, WorkerContext};
