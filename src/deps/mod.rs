// src/deps/mod.rs

//! Dependency resolution over a fixed set of valid packages.
//!
//! - [`tracker`] caches direct/transitive dependencies and dependents.
//! - [`reachability`] rejects packages that can never become buildable
//!   before a queue is constructed.

pub mod reachability;
pub mod tracker;

pub use reachability::{precheck, SchedulePlan, Unschedulable, UnschedulableReason};
pub use tracker::DependencyTracker;
