// src/queue/build_queue.rs

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::deps::DependencyTracker;
use crate::queue::state::{
    Dispatch, Progress, QueueSnapshot, QueueState, QueueStatus, StopReason,
};
use crate::types::PackageName;

/// Shared queue that many workers pull packages from.
///
/// All bookkeeping sits behind one mutex that is never held across an
/// `.await`. Waiters park on a [`Notify`] for at most one `tick`, so a
/// missed wake-up costs one tick at most and shutdown latency is bounded
/// by the same tick.
pub struct BuildQueue {
    state: Mutex<QueueState>,
    changed: Notify,
    tick: Duration,
}

impl fmt::Debug for BuildQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildQueue")
            .field("state", &*self.lock())
            .field("tick", &self.tick)
            .finish()
    }
}

impl BuildQueue {
    pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

    pub fn new(packages: Vec<PackageName>, tracker: &DependencyTracker, robust: bool) -> Self {
        Self::from_state(QueueState::new(packages, tracker, robust))
    }

    pub fn from_state(state: QueueState) -> Self {
        Self {
            state: Mutex::new(state),
            changed: Notify::new(),
            tick: Self::DEFAULT_TICK,
        }
    }

    /// Override the wait tick and the starvation limit.
    pub fn with_timing(self, tick: Duration, starvation_limit: u32) -> Self {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .with_starvation_limit(starvation_limit);
        Self {
            state: Mutex::new(state),
            changed: self.changed,
            tick,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for a package whose dependencies are satisfied and claim it.
    ///
    /// Returns `None` once the queue is done, nothing is left to hand out,
    /// or the queue starves.
    pub async fn get_valid_package(&self) -> Option<PackageName> {
        loop {
            // Register interest before scanning so a wake-up between the
            // scan and the wait is not lost.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                match state.try_dispatch(Instant::now()) {
                    Dispatch::Package(pkg) => return Some(pkg),
                    Dispatch::Finished => return None,
                    Dispatch::Wait => {}
                }
                if state.record_empty_scan() {
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }
            }

            trace!(tick_ms = self.tick.as_millis() as u64, "no package ready; waiting");
            let _ = tokio::time::timeout(self.tick, notified).await;
        }
    }

    /// Report the outcome of a package obtained from
    /// [`get_valid_package`](Self::get_valid_package).
    pub fn return_built(&self, pkg: &str, success: bool) -> bool {
        let accepted = {
            let mut state = self.lock();
            let accepted = state.return_built(pkg, success);
            debug!(package = %pkg, success, progress = %state.progress(Instant::now()), "package returned");
            accepted
        };
        self.changed.notify_waiters();
        accepted
    }

    /// Halt dispatch and wake every waiter. In-flight packages may still
    /// report back.
    pub fn stop(&self, reason: StopReason) {
        self.lock().stop(reason);
        self.changed.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.lock().is_done()
    }

    pub fn is_completed(&self) -> bool {
        self.lock().is_completed()
    }

    pub fn succeeded(&self) -> bool {
        self.lock().succeeded()
    }

    pub fn status(&self) -> QueueStatus {
        self.lock().status()
    }

    pub fn robust(&self) -> bool {
        self.lock().robust()
    }

    pub fn total(&self) -> usize {
        self.lock().total()
    }

    pub fn failed(&self) -> Vec<PackageName> {
        self.lock().failed().to_vec()
    }

    pub fn progress(&self) -> Progress {
        self.lock().progress(Instant::now())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.lock().snapshot()
    }

    /// Resolve once the queue is done, re-checking at least every tick.
    pub async fn wait_done(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            let _ = tokio::time::timeout(self.tick, notified).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn queue(pkgs: &[&str], deps: &[(&str, &[&str])], robust: bool) -> BuildQueue {
        let deps: HashMap<PackageName, Vec<PackageName>> = deps
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        let state = QueueState::with_dependencies(
            pkgs.iter().map(|s| s.to_string()).collect(),
            deps,
            robust,
        );
        BuildQueue::from_state(state).with_timing(Duration::from_millis(20), 3)
    }

    #[tokio::test]
    async fn waiter_is_woken_by_return_built() {
        let q = Arc::new(queue(&["base", "app"], &[("app", &["base"][..])], false));
        assert_eq!(q.get_valid_package().await.as_deref(), Some("base"));

        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get_valid_package().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        q.return_built("base", true);

        let got = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn stop_releases_waiters() {
        let q = Arc::new(queue(&["base", "app"], &[("app", &["base"][..])], false));
        q.get_valid_package().await;

        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get_valid_package().await })
        };
        q.stop(StopReason::Cancelled);

        let got = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
        assert!(q.is_done());
        assert_eq!(q.status(), QueueStatus::Stopped(StopReason::Cancelled));
    }

    #[tokio::test]
    async fn starvation_terminates_instead_of_hanging() {
        // `app` waits on a package that is never enqueued.
        let q = queue(&["app"], &[("app", &["ghost"][..])], false);
        let got = tokio::time::timeout(Duration::from_secs(2), q.get_valid_package())
            .await
            .unwrap();
        assert_eq!(got, None);
        assert!(q.is_done());
        assert_eq!(q.status(), QueueStatus::Stopped(StopReason::Starved));
        assert_eq!(q.snapshot().to_build, vec!["app".to_string()]);
    }

    #[tokio::test]
    async fn wait_done_returns_after_completion() {
        let q = Arc::new(queue(&["only"], &[], false));
        let pkg = q.get_valid_package().await.unwrap();

        let done = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.wait_done().await })
        };
        q.return_built(&pkg, true);
        tokio::time::timeout(Duration::from_secs(2), done)
            .await
            .unwrap()
            .unwrap();
        assert!(q.succeeded());
    }
}
