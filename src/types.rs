use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical package identifier used throughout the crate.
pub type PackageName = String;

/// One pass over the package set.
///
/// Phases always run in the order `Clean`, `Build`, `Test`; each one gets a
/// fresh queue and a fresh worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Clean,
    Build,
    Test,
}

impl Phase {
    /// Target handed to the build tool, `None` meaning its default target.
    pub fn target(self) -> Option<&'static str> {
        match self {
            Phase::Clean => Some("clean"),
            Phase::Build => None,
            Phase::Test => Some("test"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Clean => "clean",
            Phase::Build => "build",
            Phase::Test => "test",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clean" => Ok(Phase::Clean),
            "build" => Ok(Phase::Build),
            "test" => Ok(Phase::Test),
            other => Err(format!(
                "invalid phase: {other} (expected \"clean\", \"build\" or \"test\")"
            )),
        }
    }
}

/// Per-package marker files consulted by the flag tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// "Do not build this or anything depending on it."
    Blacklist,
    /// "Already built/installed elsewhere; skip but treat as satisfied."
    NoBuild,
    /// The build descriptor (e.g. a `Makefile`). Its *absence* matters.
    Descriptor,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Marker::Blacklist => "blacklist",
            Marker::NoBuild => "nobuild",
            Marker::Descriptor => "descriptor",
        };
        f.write_str(s)
    }
}
