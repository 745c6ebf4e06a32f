// src/cli.rs

//! Command-line arguments, parsed with `clap` derive.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pkgmake`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pkgmake",
    version,
    about = "Build workspace packages in parallel, in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Packages to build. Defaults to every package in the workspace file.
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Path to the workspace file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Pkgmake.toml")]
    pub config: String,

    /// Number of parallel build workers (0 = one per core).
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Keep going after failures; dependents of a failed package are still
    /// attempted.
    #[arg(short = 'r', long)]
    pub robust: bool,

    /// Drop packages that cannot be located instead of aborting.
    #[arg(long)]
    pub best_effort: bool,

    /// Run the clean target over the closure before building.
    #[arg(long)]
    pub pre_clean: bool,

    /// Run the test target on the requested packages after building.
    #[arg(short = 't', long)]
    pub test: bool,

    /// Skip the build phase.
    #[arg(long)]
    pub no_build: bool,

    /// Ignore blacklist markers.
    #[arg(long)]
    pub no_blacklist: bool,

    /// After a successful build, mark the closure as installed.
    #[arg(long, conflicts_with = "unmark_installed")]
    pub mark_installed: bool,

    /// Remove installed marks from the closure before building.
    #[arg(long)]
    pub unmark_installed: bool,

    /// Resolve and classify packages, print the plan, build nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PKGMAKE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
