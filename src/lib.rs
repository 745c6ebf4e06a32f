// src/lib.rs

pub mod cli;
pub mod config;
pub mod deps;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod flags;
pub mod fs;
pub mod logging;
pub mod metadata;
pub mod queue;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::engine::{BuildCoordinator, CancelSignal, RunOptions};
use crate::errors::Result;
use crate::exec::{CommandBuildAction, OutputClassifier};
use crate::flags::FsMarkerStore;
use crate::fs::{FileSystem, RealFileSystem};
use crate::metadata::{PackageMetadataProvider, WorkspaceMetadata};
use crate::types::{PackageName, Phase};

/// Process exit status of the `pkgmake` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every phase succeeded.
    Success,
    /// Some package failed, was interrupted or was never attempted.
    BuildFailed,
    /// The workspace file or the requested packages could not be resolved.
    ConfigError,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::BuildFailed => 1,
            ExitStatus::ConfigError => 2,
        }
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - metadata, marker store and build action
/// - the coordinator and its phases
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<ExitStatus> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let options = run_options(&cfg, &args);
    let requested = requested_packages(&cfg, &args);
    let cancel = CancelSignal::new();
    let coordinator = coordinator_for(&cfg, options, Arc::new(RealFileSystem), cancel.clone())?;

    if args.dry_run {
        print!("{}", coordinator.plan(&requested)?);
        return Ok(ExitStatus::Success);
    }

    if args.unmark_installed {
        let cleared = coordinator.unmark_installed(&requested)?;
        info!(packages = cleared.len(), "cleared installed marks");
    }

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        warn!("interrupt received; stopping");
        cancel.cancel();
    });

    let report = coordinator.run(&requested).await?;
    print!("{}", report.render_summary());

    if args.mark_installed {
        if report.phase(Phase::Build).is_some_and(|p| p.succeeded()) {
            let marked = coordinator.mark_installed(&requested)?;
            info!(packages = marked.len(), "marked packages as installed");
        } else {
            warn!("build phase did not succeed; not marking packages as installed");
        }
    }

    Ok(if report.succeeded() {
        ExitStatus::Success
    } else {
        ExitStatus::BuildFailed
    })
}

/// Coordinator for a validated workspace, running the configured build
/// tool and probing markers through `fs`.
pub fn coordinator_for(
    cfg: &ConfigFile,
    options: RunOptions,
    fs: Arc<dyn FileSystem>,
    cancel: CancelSignal,
) -> Result<BuildCoordinator> {
    let provider: Arc<dyn PackageMetadataProvider> = Arc::new(WorkspaceMetadata::from_config(cfg));
    let markers = Arc::new(FsMarkerStore::new(
        fs,
        Arc::clone(&provider),
        cfg.markers.clone(),
    ));
    let action = Arc::new(CommandBuildAction::from_config(&cfg.config).with_cancel(cancel.clone()));
    let classifier = OutputClassifier::from_config(&cfg.config)?;

    Ok(BuildCoordinator::new(provider, markers, action, classifier, options).with_cancel(cancel))
}

/// `[config]` values overridden by command-line flags.
pub fn run_options(cfg: &ConfigFile, args: &CliArgs) -> RunOptions {
    let mut options = RunOptions::from_config(&cfg.config);
    if let Some(jobs) = args.jobs {
        options.jobs = if jobs == 0 { num_cpus::get().max(1) } else { jobs };
    }
    options.robust |= args.robust;
    options.best_effort |= args.best_effort;
    options.pre_clean = args.pre_clean;
    options.build = !args.no_build;
    options.test = args.test;
    if args.no_blacklist {
        options.use_blacklist = false;
    }
    options
}

fn requested_packages(cfg: &ConfigFile, args: &CliArgs) -> Vec<PackageName> {
    if args.packages.is_empty() {
        cfg.package.keys().cloned().collect()
    } else {
        args.packages.clone()
    }
}
