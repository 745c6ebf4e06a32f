// src/exec/action.rs

//! Pluggable build action.
//!
//! Workers talk to a [`BuildAction`] rather than to processes directly, so
//! tests can script outcomes without spawning anything.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;
use crate::types::{PackageName, Phase};

/// One unit of work handed to a [`BuildAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub package: PackageName,
    /// Package directory; the build runs with this as working directory.
    pub dir: PathBuf,
    pub phase: Phase,
}

/// Raw result of a build invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildOutput {
    pub exit_code: i32,
    /// stdout and stderr interleaved by line.
    pub output: String,
    /// The action killed the build because cancellation was requested.
    pub interrupted: bool,
}

impl BuildOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            interrupted: false,
        }
    }

    /// Output of a build that was killed on cancellation.
    pub fn interrupted(output: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            output: output.into(),
            interrupted: true,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes the build tool for a single package.
///
/// Implementations must be safe to call from several workers at once.
/// An `Err` means the action could not run at all (e.g. the tool failed to
/// spawn) and is treated as a failed build.
pub trait BuildAction: Send + Sync {
    fn run<'a>(
        &'a self,
        request: &'a BuildRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BuildOutput>> + Send + 'a>>;
}
