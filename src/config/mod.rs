// src/config/mod.rs

//! Configuration loading and validation for pkgmake.
//!
//! Responsibilities:
//! - Define the TOML-backed workspace model (`model.rs`).
//! - Load a workspace file from disk (`loader.rs`).
//! - Validate basic invariants before anything is scheduled (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, MarkerSection, PackageConfig, RawConfigFile};
