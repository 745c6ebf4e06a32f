// src/exec/command.rs

//! Production build action: run the build tool as a child process.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::ConfigSection;
use crate::engine::cancel::CancelSignal;
use crate::errors::Result;
use crate::exec::action::{BuildAction, BuildOutput, BuildRequest};

/// Serializes process creation across every worker in the process.
///
/// Only the `spawn` call itself is guarded; waiting on the child and all
/// queue bookkeeping happen outside it.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Appended to the captured output when a build is killed on cancellation.
pub const INTERRUPTED_NOTICE: &str = "pkgmake: build interrupted by cancellation request";

/// Runs `<program> <args..> [target]` inside the package directory.
#[derive(Debug, Clone)]
pub struct CommandBuildAction {
    program: String,
    args: Vec<String>,
    cancel: Option<CancelSignal>,
}

impl CommandBuildAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cancel: None,
        }
    }

    pub fn from_config(cfg: &ConfigSection) -> Self {
        Self::new(cfg.build_command.clone(), cfg.build_args.clone())
    }

    /// Kill in-flight children when `signal` is raised.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    fn command_for(&self, request: &BuildRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(target) = request.phase.target() {
            cmd.arg(target);
        }
        cmd.current_dir(&request.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, request: &BuildRequest) -> Result<Child> {
        let mut cmd = self.command_for(request);
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let child = cmd.spawn().with_context(|| {
            format!(
                "spawning '{}' for package '{}' in {:?}",
                self.program, request.package, request.dir
            )
        })?;
        Ok(child)
    }

    async fn run_inner(&self, request: &BuildRequest) -> Result<BuildOutput> {
        info!(
            package = %request.package,
            phase = %request.phase,
            program = %self.program,
            "starting build process"
        );

        let mut child = self.spawn(request)?;

        let captured = Arc::new(Mutex::new(String::new()));
        let readers = [
            child.stdout.take().map(|s| capture_lines(s, Arc::clone(&captured))),
            child.stderr.take().map(|s| capture_lines(s, Arc::clone(&captured))),
        ];

        let cancel = self.cancel.clone();
        let cancelled = async move {
            match cancel {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancelled => None,
        };

        let (exit_code, interrupted) = match status {
            Some(status) => {
                let status = status.with_context(|| {
                    format!("waiting for build of package '{}'", request.package)
                })?;
                (status.code().unwrap_or(-1), false)
            }
            None => {
                info!(package = %request.package, "cancellation requested; killing build process");
                if let Err(e) = child.kill().await {
                    warn!(package = %request.package, error = %e, "failed to kill build process");
                }
                (-1, true)
            }
        };

        for reader in readers.into_iter().flatten() {
            // A killed build may leave grandchildren holding the pipes open.
            if interrupted {
                reader.abort();
                continue;
            }
            if let Err(e) = reader.await {
                debug!(package = %request.package, error = %e, "output reader task ended abnormally");
            }
        }

        let mut output = std::mem::take(
            &mut *captured.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        if interrupted {
            output.push_str(INTERRUPTED_NOTICE);
            output.push('\n');
        }

        info!(
            package = %request.package,
            phase = %request.phase,
            exit_code,
            "build process exited"
        );

        Ok(BuildOutput {
            exit_code,
            output,
            interrupted,
        })
    }
}

impl BuildAction for CommandBuildAction {
    fn run<'a>(
        &'a self,
        request: &'a BuildRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BuildOutput>> + Send + 'a>> {
        Box::pin(self.run_inner(request))
    }
}

fn capture_lines<R>(stream: R, sink: Arc<Mutex<String>>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        // Raw bytes: build tools do not promise UTF-8, and the pipe must be
        // drained to EOF or the child dies of SIGPIPE.
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let mut buf = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    buf.push_str(text.trim_end_matches(['\n', '\r']));
                    buf.push('\n');
                }
                Err(e) => {
                    debug!(error = %e, "reading build output failed");
                    break;
                }
            }
        }
    })
}
