//! External process execution with combined output capture, timeouts,
//! cancellation, and transcript logging.
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use wait_timeout::ChildExt as _;

use crate::error::DotmanError;
use crate::transcript::Transcript;

/// How often a running child is checked for cancellation and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output readers may run on after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How often finished output readers are checked for.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Standard output only.
    pub stdout: String,
    /// Standard output and standard error, interleaved in arrival order.
    pub output: String,
    /// Whether the command exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// Build a successful result with the given output (test and fake helper).
    #[must_use]
    pub fn ok(output: &str) -> Self {
        Self {
            stdout: output.to_string(),
            output: output.to_string(),
            success: true,
            code: Some(0),
        }
    }

    /// Build a failed result with exit code 1 and the given output.
    #[must_use]
    pub fn failed(output: &str) -> Self {
        Self {
            stdout: String::new(),
            output: output.to_string(),
            success: false,
            code: Some(1),
        }
    }

    /// Convert a non-zero exit into [`DotmanError::Process`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command did not succeed.
    pub fn check(self, command: &str) -> Result<Self, DotmanError> {
        if self.success {
            Ok(self)
        } else {
            Err(DotmanError::Process {
                command: command.to_string(),
                code: self.code,
                output: self.output,
            })
        }
    }

    /// Human-readable exit description, matching `exit status N`.
    #[must_use]
    pub fn exit_description(&self) -> String {
        self.code.map_or_else(
            || "terminated by signal".to_string(),
            |c| format!("exit status {c}"),
        )
    }
}

/// Reasons a command produced no exit status.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started.
    #[error("failed to execute {command}: {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Waiting on the child failed.
    #[error("failed to wait for {command}: {source}")]
    Wait {
        /// Command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The command was killed after exceeding its timeout.
    #[error("timeout after {secs}s: {command}")]
    Timeout {
        /// Command line.
        command: String,
        /// Elapsed timeout in seconds.
        secs: u64,
    },
    /// The command was killed because the operation was cancelled.
    #[error("cancelled: {command}")]
    Cancelled {
        /// Command line.
        command: String,
    },
}

/// Shared flag used to cancel an in-flight operation.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Abstraction over external command execution.
///
/// The engine only ever talks to git and stow through this trait, so tests
/// can substitute scripted fakes.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Run `program args…` in `dir` and return its result whether or not it
    /// exited successfully.
    ///
    /// # Errors
    ///
    /// Returns an error only when no exit status is available: the program
    /// could not be started, timed out, or was cancelled.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult, ExecError>;

    /// Check if a program is available on PATH.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl SystemExecutor {
    /// Create an executor. A `timeout` of `None` waits forever.
    #[must_use]
    pub const fn new(timeout: Option<Duration>, cancel: CancelToken) -> Self {
        Self { timeout, cancel }
    }
}

impl Executor for SystemExecutor {
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        let command = format_command(program, args);
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled { command });
        }

        let mut child = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command.clone(),
                source,
            })?;

        let combined = Arc::new(Mutex::new(Vec::new()));
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let mut pumps = Vec::with_capacity(2);
        if let Some(stream) = child.stdout.take() {
            let (own, combined) = (Arc::clone(&stdout), Arc::clone(&combined));
            pumps.push(thread::spawn(move || pump(stream, Some(&*own), &combined)));
        }
        if let Some(stream) = child.stderr.take() {
            let combined = Arc::clone(&combined);
            pumps.push(thread::spawn(move || pump(stream, None, &combined)));
        }

        let started = Instant::now();
        let status = loop {
            let waited = child.wait_timeout(POLL_INTERVAL).map_err(|source| ExecError::Wait {
                command: command.clone(),
                source,
            })?;
            if let Some(status) = waited {
                break status;
            }
            if self.cancel.is_cancelled() {
                tracing::debug!("cancelling: {command}");
                child.kill().ok();
                child.wait().ok();
                return Err(ExecError::Cancelled { command });
            }
            if let Some(limit) = self.timeout
                && started.elapsed() >= limit
            {
                tracing::debug!("timed out after {}s: {command}", limit.as_secs());
                child.kill().ok();
                child.wait().ok();
                return Err(ExecError::Timeout {
                    command,
                    secs: limit.as_secs(),
                });
            }
        };

        // A grandchild may inherit the pipes and keep them open after the
        // child exits; readers still running at the drain deadline are
        // detached and the output collected so far is used.
        let remaining = self
            .timeout
            .map_or(DRAIN_GRACE, |limit| limit.saturating_sub(started.elapsed()));
        let drain_deadline = Instant::now() + remaining.clamp(POLL_INTERVAL, DRAIN_GRACE);
        while pumps.iter().any(|h| !h.is_finished()) {
            if Instant::now() >= drain_deadline || self.cancel.is_cancelled() {
                tracing::debug!("output pipes still open after exit, detaching readers: {command}");
                break;
            }
            thread::sleep(DRAIN_POLL);
        }
        for handle in pumps {
            if handle.is_finished() {
                handle.join().ok();
            }
        }

        let read = |buf: &Mutex<Vec<u8>>| {
            buf.lock()
                .map(|b| String::from_utf8_lossy(&b).to_string())
                .unwrap_or_default()
        };
        Ok(ExecResult {
            stdout: read(&*stdout),
            output: read(&*combined),
            success: status.success(),
            code: status.code(),
        })
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Drain `stream`, appending every chunk to `combined` as it arrives and,
/// when given, to `own` as well.
fn pump(mut stream: impl Read, own: Option<&Mutex<Vec<u8>>>, combined: &Mutex<Vec<u8>>) {
    let mut buf = [0u8; 8192];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let chunk = buf.get(..n).unwrap_or_default();
        if let Some(Ok(mut guard)) = own.map(Mutex::lock) {
            guard.extend_from_slice(chunk);
        }
        if let Ok(mut guard) = combined.lock() {
            guard.extend_from_slice(chunk);
        }
    }
}

/// Render a command line the way it is shown in transcripts.
#[must_use]
pub fn format_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Run a command and record it in `transcript`.
///
/// Appends `Running: <command>`, then `Output:\n<output>` when the combined
/// output is non-empty, then `Error: <reason>` when the command failed or
/// produced no exit status. The result is returned even on non-zero exit so
/// callers can inspect the output.
///
/// # Errors
///
/// Returns an error if the command could not be started, timed out, or was
/// cancelled.
pub fn run_logged(
    executor: &dyn Executor,
    dir: &Path,
    program: &str,
    args: &[&str],
    transcript: &mut Transcript,
) -> Result<ExecResult, DotmanError> {
    let command = format_command(program, args);
    transcript.push(format!("Running: {command}"));
    match executor.run_in(dir, program, args) {
        Ok(result) => {
            let trimmed = result.output.trim();
            if !trimmed.is_empty() {
                transcript.push(format!("Output:\n{trimmed}"));
            }
            if !result.success {
                transcript.push(format!("Error: {}", result.exit_description()));
            }
            Ok(result)
        }
        Err(e) => {
            transcript.push(format!("Error: {e}"));
            Err(e.into())
        }
    }
}

/// Like [`run_logged`], but a non-zero exit becomes [`DotmanError::Process`].
///
/// # Errors
///
/// Returns an error if the command fails for any reason.
pub fn run_logged_checked(
    executor: &dyn Executor,
    dir: &Path,
    program: &str,
    args: &[&str],
    transcript: &mut Transcript,
) -> Result<ExecResult, DotmanError> {
    run_logged(executor, dir, program, args, transcript)?.check(&format_command(program, args))
}
