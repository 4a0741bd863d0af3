//! Commands: `sync`, `status`, `reset`.
use anyhow::Result;
use serde::Serialize;

use super::{Output, finish};
use crate::cli::StatusOpts;
use crate::engine::Engine;
use crate::git::RepoStatus;
use crate::logging;
use crate::transcript::Outcome;

/// Run the smart sync.
///
/// # Errors
///
/// Returns the failing step's error.
pub fn sync(engine: &Engine, output: Output) -> Result<()> {
    logging::stage("Syncing repository");
    finish(engine.sync(), output, |report| {
        if report.committed {
            println!("committed pending changes");
        }
        if let Some(status) = &report.status {
            print_status(status);
        }
    })
}

#[derive(Debug, Serialize)]
struct StatusView {
    #[serde(flatten)]
    status: RepoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<String>>,
}

/// Show repository status.
///
/// # Errors
///
/// Returns an error if git cannot be queried.
pub fn status(engine: &Engine, opts: &StatusOpts, output: Output) -> Result<()> {
    let outcome = engine.status(opts.fetch);
    let Outcome { result, transcript } = outcome;
    let result = result.and_then(|status| {
        let files = if opts.files {
            Some(engine.uncommitted_files().into_result()?)
        } else {
            None
        };
        Ok(StatusView { status, files })
    });
    finish(Outcome { result, transcript }, output, |view| {
        print_status(&view.status);
        for file in view.files.iter().flatten() {
            println!("  {file}");
        }
    })
}

/// Discard local changes to a file.
///
/// # Errors
///
/// Returns an error if the checkout fails.
pub fn reset(engine: &Engine, file: &str, output: Output) -> Result<()> {
    logging::stage(&format!("Resetting {file}"));
    finish(engine.reset_file(file), output, |_| println!("reset {file}"))
}

fn print_status(status: &RepoStatus) {
    println!(
        "branch:  {}",
        status.branch.as_deref().unwrap_or("(unknown)")
    );
    println!("sync:    {}", status.sync);
    println!("pending: {}", status.pending);
    if let Some(commit) = &status.last_commit {
        println!("last:    {} {}", commit.hash, commit.subject);
    }
}
