// src/exec/worker.rs

//! Worker loop: pull a package, gate it, build it, report it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::report::{PackageOutcome, PackageResult};
use crate::exec::action::{BuildAction, BuildRequest};
use crate::exec::classify::{BuildOutcome, OutputClassifier};
use crate::flags::PackageFlagTracker;
use crate::metadata::PackageMetadataProvider;
use crate::queue::{BuildQueue, StopReason};
use crate::types::Phase;

/// Which flag-tracker rules apply before a package is handed to the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub use_blacklist: bool,
    pub require_build_descriptor: bool,
    /// Pass the queue's failed packages to the gate. Off in robust mode and
    /// in the test phase.
    pub gate_failed_ancestors: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            use_blacklist: true,
            require_build_descriptor: true,
            gate_failed_ancestors: true,
        }
    }
}

/// Everything a worker shares with its siblings for one phase.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<BuildQueue>,
    pub action: Arc<dyn BuildAction>,
    pub flags: Arc<PackageFlagTracker>,
    pub provider: Arc<dyn PackageMetadataProvider>,
    pub classifier: Arc<OutputClassifier>,
    pub phase: Phase,
    pub policy: GatePolicy,
    pub results: mpsc::Sender<PackageResult>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("phase", &self.phase)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    /// Run until the queue hands out no more work, a build fails in a
    /// non-robust queue, or a build is interrupted.
    pub async fn run(self) {
        let queue = Arc::clone(&self.ctx.queue);
        debug!(worker = self.id, phase = %self.ctx.phase, "worker started");

        while let Some(pkg) = queue.get_valid_package().await {
            let result = self.process(&pkg).await;
            let outcome = result.outcome;

            // Halt dispatch before reporting, so no sibling claims a
            // dependent in between.
            let halt = match outcome {
                PackageOutcome::Interrupted => Some(StopReason::Cancelled),
                PackageOutcome::Failed if !queue.robust() => Some(StopReason::Failure),
                _ => None,
            };
            if let Some(reason) = halt {
                queue.stop(reason);
            }

            if !queue.return_built(&pkg, outcome.is_success()) {
                warn!(worker = self.id, package = %pkg, "queue did not expect this package back");
            }
            info!(
                worker = self.id,
                package = %pkg,
                phase = %self.ctx.phase,
                outcome = %outcome,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "{}",
                queue.progress()
            );

            if self.ctx.results.send(result).await.is_err() {
                debug!(worker = self.id, "result receiver dropped");
            }

            if halt.is_some() {
                break;
            }
        }

        debug!(worker = self.id, phase = %self.ctx.phase, "worker exiting");
    }

    async fn process(&self, pkg: &str) -> PackageResult {
        let started = Instant::now();
        let ctx = &self.ctx;
        let finish = |outcome: PackageOutcome, output: String, reason: Option<String>| {
            PackageResult {
                package: pkg.to_string(),
                phase: ctx.phase,
                outcome,
                elapsed: started.elapsed(),
                output,
                reason,
            }
        };

        let failed = if ctx.policy.gate_failed_ancestors {
            ctx.queue.failed()
        } else {
            Vec::new()
        };
        let verdict = ctx.flags.can_build(
            pkg,
            ctx.policy.use_blacklist,
            &failed,
            ctx.policy.require_build_descriptor,
        );
        if !verdict.buildable {
            let outcome = if verdict.blocks_dependents {
                PackageOutcome::Failed
            } else {
                PackageOutcome::Skipped
            };
            info!(package = %pkg, phase = %ctx.phase, reason = %verdict.reason, "not building");
            return finish(outcome, String::new(), Some(verdict.reason));
        }

        let dir = match ctx.provider.path(pkg) {
            Ok(dir) => dir,
            Err(e) => return finish(PackageOutcome::Failed, String::new(), Some(e.to_string())),
        };
        let request = BuildRequest {
            package: pkg.to_string(),
            dir,
            phase: ctx.phase,
        };

        match ctx.action.run(&request).await {
            Ok(out) => {
                let outcome = ctx.classifier.classify(&out);
                let reason = match outcome {
                    BuildOutcome::Skipped => Some(format!("nothing to do for {}", ctx.phase)),
                    BuildOutcome::Failed => Some(format!("exit code {}", out.exit_code)),
                    BuildOutcome::Success | BuildOutcome::Interrupted => None,
                };
                finish(outcome.into(), out.output, reason)
            }
            Err(e) => {
                warn!(package = %pkg, phase = %ctx.phase, error = %e, "build action failed to run");
                finish(PackageOutcome::Failed, String::new(), Some(format!("{e:#}")))
            }
        }
    }
}

/// Spawn `count` workers (at least one) sharing `ctx`.
pub fn spawn_workers(count: usize, ctx: WorkerContext) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| tokio::spawn(Worker::new(id, ctx.clone()).run()))
        .collect()
}
