use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use pkgmake::engine::CancelSignal;
use pkgmake::errors::Result;
use pkgmake::exec::{BuildAction, BuildOutput, BuildRequest};
use pkgmake::types::{PackageName, Phase};

/// Start/finish of one scripted build, in global order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    Started(PackageName),
    Finished(PackageName),
}

#[derive(Default)]
struct Recorder {
    requests: Vec<BuildRequest>,
    events: Vec<ActionEvent>,
    active: usize,
    max_active: usize,
}

/// A fake build action that:
/// - answers with a scripted exit code and output per package (and
///   optionally per phase); unscripted packages succeed
/// - records every request and the start/finish order
/// - optionally sleeps to overlap builds, tracking peak concurrency
/// - answers "Interrupted" if its cancel signal fires mid-build.
#[derive(Default)]
pub struct ScriptedBuildAction {
    responses: HashMap<(PackageName, Option<Phase>), BuildOutput>,
    delays: HashMap<PackageName, Duration>,
    default_delay: Duration,
    cancel: Option<CancelSignal>,
    recorder: Mutex<Recorder>,
}

impl ScriptedBuildAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every build takes `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Builds of `pkg` take `delay`.
    pub fn delay(mut self, pkg: &str, delay: Duration) -> Self {
        self.delays.insert(pkg.to_string(), delay);
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// `pkg` exits with `code` and `output` in every phase.
    pub fn respond(mut self, pkg: &str, code: i32, output: &str) -> Self {
        self.responses
            .insert((pkg.to_string(), None), BuildOutput::new(code, output));
        self
    }

    /// `pkg` exits with `code` and `output` in `phase` only.
    pub fn respond_in(mut self, pkg: &str, phase: Phase, code: i32, output: &str) -> Self {
        self.responses
            .insert((pkg.to_string(), Some(phase)), BuildOutput::new(code, output));
        self
    }

    pub fn fail(self, pkg: &str) -> Self {
        self.respond(pkg, 2, &format!("make: *** [{pkg}] Error 2\n"))
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.recorder.lock().unwrap().requests.clone()
    }

    /// Packages in the order the action was invoked for them.
    pub fn dispatched(&self) -> Vec<PackageName> {
        self.requests().into_iter().map(|r| r.package).collect()
    }

    pub fn dispatched_in(&self, phase: Phase) -> Vec<PackageName> {
        self.requests()
            .into_iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.package)
            .collect()
    }

    pub fn events(&self) -> Vec<ActionEvent> {
        self.recorder.lock().unwrap().events.clone()
    }

    /// Highest number of builds that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.recorder.lock().unwrap().max_active
    }

    /// True if `dep` finished before `pkg` started (and both ran).
    pub fn finished_before_started(&self, dep: &str, pkg: &str) -> bool {
        let events = self.events();
        let finished = events
            .iter()
            .position(|e| *e == ActionEvent::Finished(dep.to_string()));
        let started = events
            .iter()
            .position(|e| *e == ActionEvent::Started(pkg.to_string()));
        matches!((finished, started), (Some(f), Some(s)) if f < s)
    }

    fn response_for(&self, request: &BuildRequest) -> BuildOutput {
        self.responses
            .get(&(request.package.clone(), Some(request.phase)))
            .or_else(|| self.responses.get(&(request.package.clone(), None)))
            .cloned()
            .unwrap_or_else(|| BuildOutput::new(0, format!("built {}\n", request.package)))
    }
}

impl BuildAction for ScriptedBuildAction {
    fn run<'a>(
        &'a self,
        request: &'a BuildRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BuildOutput>> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut rec = self.recorder.lock().unwrap();
                rec.requests.push(request.clone());
                rec.events.push(ActionEvent::Started(request.package.clone()));
                rec.active += 1;
                rec.max_active = rec.max_active.max(rec.active);
            }

            let delay = self
                .delays
                .get(&request.package)
                .copied()
                .unwrap_or(self.default_delay);

            let interrupted = match &self.cancel {
                Some(signal) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = signal.cancelled() => true,
                    }
                }
                None => {
                    tokio::time::sleep(delay).await;
                    false
                }
            };

            {
                let mut rec = self.recorder.lock().unwrap();
                rec.active -= 1;
                rec.events.push(ActionEvent::Finished(request.package.clone()));
            }

            if interrupted {
                Ok(BuildOutput::interrupted("Interrupted\n"))
            } else {
                Ok(self.response_for(request))
            }
        })
    }
}
