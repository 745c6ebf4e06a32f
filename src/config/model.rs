// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Workspace file exactly as deserialized, before validation.
///
/// ```toml
/// [config]
/// jobs = 4
/// robust = false
///
/// [markers]
/// nobuild = "NOBUILD"
///
/// [package.core]
/// path = "pkgs/core"
///
/// [package.app]
/// path = "pkgs/app"
/// depends = ["core"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub markers: MarkerSection,

    /// All packages from `[package.<name>]`, keyed by package name.
    #[serde(default)]
    pub package: BTreeMap<String, PackageConfig>,
}

/// Validated workspace. Construct through `ConfigFile::try_from(raw)` or
/// [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub markers: MarkerSection,
    pub package: BTreeMap<String, PackageConfig>,
    /// Directory package paths are resolved against.
    pub root: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        markers: MarkerSection,
        package: BTreeMap<String, PackageConfig>,
    ) -> Self {
        Self {
            config,
            markers,
            package,
            root: PathBuf::from("."),
        }
    }

    /// Re-anchor relative package paths at `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Absolute (or root-relative) directory of a declared package.
    pub fn package_dir(&self, name: &str) -> Option<PathBuf> {
        let pkg = self.package.get(name)?;
        let path = Path::new(&pkg.path);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(self.root.join(path))
        }
    }
}

/// `[config]` section: scheduling and build-tool behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Number of concurrent workers; `0` means one per host core.
    #[serde(default)]
    pub jobs: usize,

    /// Keep going after a failure and treat failed dependencies as
    /// satisfied for scheduling.
    #[serde(default)]
    pub robust: bool,

    /// Drop packages that cannot be located instead of aborting.
    #[serde(default)]
    pub best_effort: bool,

    /// Honour blacklist markers.
    #[serde(default = "default_true")]
    pub use_blacklist: bool,

    /// Treat a package without a build descriptor as "nothing to build".
    #[serde(default = "default_true")]
    pub require_build_descriptor: bool,

    /// Queue wait tick in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Consecutive empty scans with no active worker before a queue gives up.
    #[serde(default = "default_starvation_limit")]
    pub starvation_limit: u32,

    #[serde(default = "default_build_command")]
    pub build_command: String,

    #[serde(default)]
    pub build_args: Vec<String>,

    /// Regex marking a failed run as "nothing to do".
    #[serde(default = "default_skip_pattern")]
    pub skip_pattern: String,

    /// Regex marking a failed run as interrupted.
    #[serde(default = "default_interrupt_pattern")]
    pub interrupt_pattern: String,
}

fn default_true() -> bool {
    true
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_starvation_limit() -> u32 {
    3
}

fn default_build_command() -> String {
    "make".to_string()
}

fn default_skip_pattern() -> String {
    "No rule to make target".to_string()
}

fn default_interrupt_pattern() -> String {
    r"(?m)^make(\[\d+\])?: \*\*\* .*Interrupt".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: 0,
            robust: false,
            best_effort: false,
            use_blacklist: default_true(),
            require_build_descriptor: default_true(),
            tick_ms: default_tick_ms(),
            starvation_limit: default_starvation_limit(),
            build_command: default_build_command(),
            build_args: Vec::new(),
            skip_pattern: default_skip_pattern(),
            interrupt_pattern: default_interrupt_pattern(),
        }
    }
}

impl ConfigSection {
    /// Worker count after resolving `jobs = 0` to the host core count.
    pub fn effective_jobs(&self) -> usize {
        match self.jobs {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

/// `[markers]` section: file names probed inside each package directory.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerSection {
    #[serde(default = "default_blacklist_marker")]
    pub blacklist: String,

    #[serde(default = "default_nobuild_marker")]
    pub nobuild: String,

    #[serde(default = "default_descriptor_marker")]
    pub descriptor: String,
}

fn default_blacklist_marker() -> String {
    "BUILD_BLACKLIST".to_string()
}

fn default_nobuild_marker() -> String {
    "NOBUILD".to_string()
}

fn default_descriptor_marker() -> String {
    "Makefile".to_string()
}

impl Default for MarkerSection {
    fn default() -> Self {
        Self {
            blacklist: default_blacklist_marker(),
            nobuild: default_nobuild_marker(),
            descriptor: default_descriptor_marker(),
        }
    }
}

/// `[package.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageConfig {
    /// Package directory, relative to the workspace file unless absolute.
    pub path: String,

    /// Direct dependencies. Names that are not declared packages are
    /// reported as "not found" at run time, not rejected here.
    #[serde(default)]
    pub depends: Vec<String>,
}
