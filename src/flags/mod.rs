// src/flags/mod.rs

//! Per-package buildability policy.
//!
//! - [`markers`] probes, creates and removes marker files.
//! - [`tracker`] classifies packages once and turns the result, plus any
//!   failed ancestors, into a [`BuildabilityVerdict`].

pub mod markers;
pub mod tracker;

pub use markers::{FsMarkerStore, MarkerStore};
pub use tracker::{BuildabilityVerdict, PackageFlagTracker, PackageFlags, PackageState};
