//! Subcommand handlers.
//!
//! Each handler calls one [`Engine`] operation and renders its [`Outcome`]:
//! human-readable text by default, or a single JSON document with `--json`.
//! Transcript lines have already been streamed to the log while the
//! operation ran.
pub mod completions;
pub mod package;
pub mod profile;
pub mod repo;
pub mod storage;
pub mod version;

use anyhow::Result;
use serde::Serialize;

use crate::cli::Command;
use crate::engine::Engine;
use crate::transcript::Outcome;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Plain text on stdout.
    Text,
    /// One JSON document on stdout.
    Json,
}

#[derive(Serialize)]
struct JsonOutcome<'a, T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    transcript: &'a [String],
}

/// Render an outcome and convert its error for the CLI boundary.
///
/// # Errors
///
/// Returns the operation's error, or a serialization error in JSON mode.
pub fn finish<T: Serialize>(outcome: Outcome<T>, output: Output, render: impl FnOnce(&T)) -> Result<()> {
    let Outcome { result, transcript } = outcome;
    match (result, output) {
        (Ok(value), Output::Text) => {
            render(&value);
            Ok(())
        }
        (Ok(value), Output::Json) => {
            let doc = JsonOutcome {
                ok: true,
                result: Some(&value),
                error: None,
                transcript: &transcript,
            };
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        (Err(e), Output::Text) => Err(e.into()),
        (Err(e), Output::Json) => {
            let doc = JsonOutcome::<()> {
                ok: false,
                result: None,
                error: Some(e.to_string()),
                transcript: &transcript,
            };
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Err(e.into())
        }
    }
}

/// Run an engine-backed subcommand.
///
/// # Errors
///
/// Returns the failing operation's error.
pub fn dispatch(engine: &Engine, command: Command, output: Output) -> Result<()> {
    match command {
        Command::Profile(cmd) => profile::run(engine, cmd, output),
        Command::Package(cmd) => package::run(engine, cmd, output),
        Command::Storage(cmd) => storage::run(engine, cmd, output),
        Command::Sync => repo::sync(engine, output),
        Command::Status(opts) => repo::status(engine, &opts, output),
        Command::Reset { file } => repo::reset(engine, &file, output),
        Command::Completions { shell } => {
            completions::run(shell);
            Ok(())
        }
        Command::Version => {
            version::run();
            Ok(())
        }
    }
}
