//! Worker process management for snippet execution.
//!
//! Each snippet runs in a freshly spawned interpreter. The worker reads one
//! request frame from stdin and writes one result frame to stdout; anything
//! the snippet or its libraries print ends up on stderr.

use std::io::{BufWriter, Read};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::interpreter::Interpreter;

use super::protocol::{WorkerRequest, WorkerResponse, decode_channel, write_message};

/// Program every worker runs.
const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// How often [`WorkerHandle::wait_timeout`] polls for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// OS-level limits applied to a worker before it starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerLimits {
    /// Cap on the worker's address space, in bytes. Unix only.
    pub memory_limit_bytes: Option<u64>,
}

/// Handle to a worker process.
///
/// Stdout and stderr are drained on background threads from the moment the
/// process starts, so a chatty snippet can never block on a full pipe.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Request pipe. Closed after the request is written.
    stdin: Option<BufWriter<ChildStdin>>,
    /// Everything the worker wrote to its result channel.
    stdout_rx: Receiver<std::io::Result<Vec<u8>>>,
    /// Everything the worker wrote to stderr.
    stderr_rx: Receiver<std::io::Result<Vec<u8>>>,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn a new worker process running under `interpreter`.
    pub fn spawn(interpreter: &Interpreter, limits: &WorkerLimits) -> Result<Self> {
        let mut command = Command::new(interpreter.path());
        command
            .args(["-u", "-c", BOOTSTRAP])
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        interpreter.apply_search_path(&mut command);

        Self::isolate(&mut command, limits);

        let mut child = command.spawn().map_err(|e| {
            Error::Ipc(format!(
                "Failed to spawn worker process '{}': {}",
                interpreter.path().display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stderr".to_string()))?;

        tracing::debug!("Spawned worker pid {}", child.id());

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout_rx: drain(stdout),
            stderr_rx: drain(stderr),
            killed: false,
        })
    }

    /// Put the worker in its own process group and apply resource limits.
    #[cfg(unix)]
    fn isolate(command: &mut Command, limits: &WorkerLimits) {
        use std::os::unix::process::CommandExt;

        command.process_group(0);

        if let Some(bytes) = limits.memory_limit_bytes {
            let limit = libc::rlimit {
                rlim_cur: bytes as libc::rlim_t,
                rlim_max: bytes as libc::rlim_t,
            };
            // SAFETY: only calls setrlimit, which is async-signal-safe.
            unsafe {
                command.pre_exec(move || {
                    if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }
    }

    #[cfg(not(unix))]
    fn isolate(_command: &mut Command, limits: &WorkerLimits) {
        if limits.memory_limit_bytes.is_some() {
            tracing::warn!("Worker memory limits are only supported on Unix");
        }
    }

    /// Send the request and close stdin.
    pub fn send_request(&mut self, request: &WorkerRequest) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Request already sent to worker".to_string()))?;
        write_message(&mut stdin, request)
        // stdin dropped here, so the worker sees EOF after the frame
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// Returns `None` if it is still running when the time is up. A timeout
    /// too large to represent as an instant waits without a deadline.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(status) = self
                .child
                .try_wait()
                .map_err(|e| Error::Ipc(format!("Failed to wait for worker: {}", e)))?
            {
                return Ok(Some(status));
            }

            let Some(deadline) = deadline else {
                thread::sleep(POLL_INTERVAL);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Collect the result frame, waiting at most `wait` for the channel to close.
    ///
    /// `Ok(None)` means the worker exited without writing anything.
    pub fn take_response(&mut self, wait: Duration) -> Result<Option<WorkerResponse>> {
        let bytes = match self.stdout_rx.recv_timeout(wait) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(Error::Ipc(format!("Failed to read worker result: {}", e)));
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::Ipc(format!(
                    "Worker result channel still open after {:?}",
                    wait
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Ipc("Worker result already taken".to_string()));
            }
        };

        decode_channel(&bytes)
    }

    /// Whatever the worker wrote to stderr, waiting at most `wait`.
    ///
    /// Best effort: returns an empty string if nothing arrives in time.
    pub fn stderr_output(&mut self, wait: Duration) -> String {
        match self.stderr_rx.recv_timeout(wait) {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
            _ => String::new(),
        }
    }

    /// Kill the worker and everything it spawned.
    pub fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        self.stdin = None;

        #[cfg(unix)]
        {
            // The worker leads its own process group.
            let pgid = self.child.id() as libc::pid_t;
            // SAFETY: kill has no memory-safety preconditions.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }

        if let Err(e) = self.child.kill() {
            // InvalidInput means the process already exited, which is fine
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill worker: {}", e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();
        tracing::debug!("Killed worker pid {}", self.child.id());
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill();
        }
    }
}

/// Read a pipe to EOF on a background thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<std::io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}
