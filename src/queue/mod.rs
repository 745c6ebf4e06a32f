// src/queue/mod.rs

//! Dependency-aware build queue.
//!
//! The pure state machine lives in [`state`]; [`build_queue`] wraps it in a
//! mutex and a wake-up signal so many workers can pull from it.

pub mod build_queue;
pub mod state;

pub use build_queue::BuildQueue;
pub use state::{Dispatch, Progress, QueueSnapshot, QueueState, QueueStatus, StopReason};
