//! Worker subprocess supervision.
//!
//! Spawns the worker executable with piped standard streams, drains its
//! stderr on a background thread, and manages shutdown: a bounded wait
//! for exit, escalating to a kill, then joining the drain and removing
//! any scratch artifacts.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sqinn_core::error::{Error, LaunchError, Result, TransportError, TransportErrorKind};

use crate::config::{LogSink, SqinnConfig};

/// How often the shutdown wait polls for process exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A spawned worker with its protocol pipes split out.
pub(crate) struct SpawnedWorker {
    pub process: WorkerProcess,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

impl std::fmt::Debug for SpawnedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedWorker").finish_non_exhaustive()
    }
}

/// A running worker subprocess and its supervision state.
pub(crate) struct WorkerProcess {
    child: Child,
    drain: Option<JoinHandle<()>>,
    scratch_dir: Option<std::path::PathBuf>,
    released: bool,
}

/// Spawn the worker configured in `config` and wire up its streams.
///
/// On failure nothing is left behind: a spawn error means no child and
/// no pipes exist.
pub(crate) fn spawn(config: &SqinnConfig) -> Result<SpawnedWorker> {
    let argv = config.argv();
    let mut child = Command::new(&config.exe)
        .args(&argv)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::Launch(LaunchError {
                message: format!("cannot launch {:?}: {e}", config.exe),
                source: Some(e),
            })
        })?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
        // Piped streams are always present after a successful spawn;
        // kill the child rather than leak it if that ever changes.
        let _ = child.kill();
        let _ = child.wait();
        return Err(Error::Launch(LaunchError {
            message: format!("{:?} spawned without piped standard streams", config.exe),
            source: None,
        }));
    };

    tracing::debug!(
        target: "sqinn::process",
        exe = %config.exe,
        pid = child.id(),
        ?argv,
        "launched worker"
    );

    let drain = start_drain(stderr, config.sink());

    Ok(SpawnedWorker {
        process: WorkerProcess {
            child,
            drain,
            scratch_dir: config.scratch_dir.clone(),
            released: false,
        },
        stdin,
        stdout,
    })
}

/// Start the stderr drain thread.
///
/// The thread lives until the worker closes its stderr, which happens at
/// process exit; shutdown joins it then. Read failures go to the sink,
/// never to callers.
fn start_drain(stderr: std::process::ChildStderr, sink: LogSink) -> Option<JoinHandle<()>> {
    let result = std::thread::Builder::new()
        .name("sqinn-stderr-drain".to_string())
        .spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(text) => sink(&format!("[sqinn] {text}")),
                    Err(e) => {
                        sink(&format!("cannot read worker stderr: {e}"));
                        break;
                    }
                }
            }
        });
    match result {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(target: "sqinn::process", "cannot start stderr drain: {e}");
            None
        }
    }
}

impl WorkerProcess {
    /// Wait for the worker to exit, killing it after the grace period,
    /// then join the drain thread and remove scratch artifacts.
    ///
    /// Idempotent: a second call is a no-op. The goodbye message (quit
    /// call or sentinel) must already have been sent; this only
    /// supervises the exit.
    pub fn shutdown(&mut self, grace: Duration) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let deadline = Instant::now() + grace;
        let wait_result = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(target: "sqinn::process", %status, "worker exited");
                    break Ok(());
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            target: "sqinn::process",
                            pid = self.child.id(),
                            "worker did not exit within grace period, killing it"
                        );
                        let _ = self.child.kill();
                        break self.child.wait().map(|_| ()).map_err(wait_error);
                    }
                    std::thread::sleep(EXIT_POLL_INTERVAL);
                }
                Err(e) => break Err(wait_error(e)),
            }
        };

        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
        if let Some(dir) = self.scratch_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(
                    target: "sqinn::process",
                    dir = %dir.display(),
                    "cannot remove scratch dir: {e}"
                );
            }
        }
        wait_result
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // Never leave a zombie behind when shutdown was skipped.
        if !self.released {
            let _ = self.child.kill();
            let _ = self.child.wait();
            if let Some(handle) = self.drain.take() {
                let _ = handle.join();
            }
        }
    }
}

fn wait_error(source: std::io::Error) -> Error {
    Error::Transport(TransportError {
        kind: TransportErrorKind::Io,
        message: format!("cannot await worker exit: {source}"),
        source: Some(source),
    })
}
