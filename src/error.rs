//! Domain-specific error types for the dotman engine.
//!
//! Library code returns [`DotmanError`]; command handlers at the CLI boundary
//! convert it to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error taxonomy
//!
//! ```text
//! DotmanError
//! ├── Process / Spawn     : external command exited non-zero or failed to start
//! ├── Timeout / Cancelled : external command was killed
//! ├── ConflictUnparseable : stow reported a conflict we could not parse
//! ├── PathValidation      : rejected before any filesystem mutation
//! ├── PartialMutation     : an irreversible step ran, a later one failed
//! ├── PartialApply        : profile apply stopped at a named package
//! ├── Repository          : e.g. no current branch
//! ├── MissingTool         : git or stow not on PATH
//! └── Io / Config / NotFound
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::exec::ExecError;

/// Convenience alias for results produced by the engine.
pub type Result<T, E = DotmanError> = std::result::Result<T, E>;

/// Top-level error type for the dotman engine.
#[derive(Error, Debug)]
pub enum DotmanError {
    /// An external command exited non-zero.
    #[error("{command} failed (exit {}): {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()), output.trim())]
    Process {
        /// The full command line that was run.
        command: String,
        /// Exit status, `None` when killed by a signal.
        code: Option<i32>,
        /// Combined stdout/stderr of the command.
        output: String,
    },

    /// An external command could not be started.
    #[error("failed to execute {command}: {source}")]
    Spawn {
        /// The full command line that was attempted.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An external command exceeded its configured timeout.
    #[error("timeout: {command} did not finish within {secs}s")]
    Timeout {
        /// The full command line that was killed.
        command: String,
        /// Timeout that elapsed, in seconds.
        secs: u64,
    },

    /// The operation was cancelled by the user.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The link tool reported a conflict but no path could be extracted.
    #[error("conflict suspected in package '{package}' but no paths could be parsed:\n{output}")]
    ConflictUnparseable {
        /// Package being linked.
        package: String,
        /// Raw link tool output.
        output: String,
    },

    /// A supplied path or name was rejected before any mutation happened.
    #[error("{0}")]
    PathValidation(String),

    /// An irreversible step succeeded but a later step failed.
    #[error("{operation} partially completed: {detail}")]
    PartialMutation {
        /// Name of the multi-step operation.
        operation: String,
        /// What happened and where the data now lives.
        detail: String,
    },

    /// Applying a profile stopped at a package; earlier packages stay linked.
    #[error("profile '{profile}' partially applied: package '{package}' failed after {} package(s) were linked: {source}", applied.len())]
    PartialApply {
        /// Profile being applied.
        profile: String,
        /// Package that failed.
        package: String,
        /// Packages linked before the failure.
        applied: Vec<String>,
        /// The failure.
        source: Box<DotmanError>,
    },

    /// The repository is not in a state the operation can work with.
    #[error("{0}")]
    Repository(String),

    /// A required external program is not on `PATH`.
    #[error("required program '{0}' was not found on PATH")]
    MissingTool(String),

    /// A named entity does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of entity (`profile`, `package`, `storage item`).
        kind: &'static str,
        /// Name that was looked up.
        name: String,
    },

    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// Underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration could not be loaded.
    #[error("configuration error in {}: {message}", path.display())]
    Config {
        /// Config file path.
        path: PathBuf,
        /// Parse or read error.
        message: String,
    },
}

impl DotmanError {
    /// Wrap a filesystem helper error with a short description.
    pub fn io(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        let source: anyhow::Error = source.into();
        Self::Io {
            context: context.into(),
            source: format!("{source:#}").into(),
        }
    }

    /// Whether this error was produced by a timeout or a user cancellation.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled(_))
    }
}

impl From<ExecError> for DotmanError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Spawn { command, source } => Self::Spawn { command, source },
            ExecError::Timeout { command, secs } => Self::Timeout { command, secs },
            ExecError::Cancelled { command } => Self::Cancelled(command),
            ExecError::Wait { command, source } => Self::Spawn { command, source },
        }
    }
}
