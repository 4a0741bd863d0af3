//! Git operations used by sync and status reporting.
//!
//! Every call runs the external `git` program in the repository root. Calls
//! that take a [`Transcript`] are part of an audited action and log
//! themselves; the others are read-only queries for status display.
use std::path::Path;

use serde::Serialize;

use crate::error::{DotmanError, Result};
use crate::exec::{ExecResult, Executor, format_command, run_logged, run_logged_checked};
use crate::transcript::Transcript;

/// Remote used for fetch, pull and push.
pub const REMOTE: &str = "origin";

/// Commits the local branch is behind and ahead of its remote counterpart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Commits on the remote not yet in `HEAD`.
    pub behind: u32,
    /// Commits in `HEAD` not yet on the remote.
    pub ahead: u32,
}

impl Divergence {
    /// Parse `git rev-list --left-right --count` output (`"<behind>\t<ahead>"`).
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        let mut fields = output.split_whitespace();
        let behind = fields.next()?.parse().ok()?;
        let ahead = fields.next()?.parse().ok()?;
        Some(Self { behind, ahead })
    }

    /// Short display form: `Up to date` or `↓B ↑A`.
    #[must_use]
    pub fn sync_text(self) -> String {
        if self.behind == 0 && self.ahead == 0 {
            "Up to date".to_string()
        } else {
            format!("↓{} ↑{}", self.behind, self.ahead)
        }
    }
}

/// The most recent commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    /// Abbreviated hash.
    pub hash: String,
    /// Subject line.
    pub subject: String,
}

/// Snapshot of the repository's state for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    /// Current branch, `None` when detached or undeterminable.
    pub branch: Option<String>,
    /// Number of uncommitted changes.
    pub pending: usize,
    /// Divergence from the remote, `None` when unavailable.
    pub divergence: Option<Divergence>,
    /// Human-readable sync state.
    pub sync: String,
    /// Latest commit, `None` in an empty repository.
    pub last_commit: Option<CommitInfo>,
}

/// Git command wrapper bound to a repository root.
#[derive(Debug, Clone, Copy)]
pub struct Git<'a> {
    executor: &'a dyn Executor,
    root: &'a Path,
    program: &'a str,
}

impl<'a> Git<'a> {
    /// Run `program` (usually `git`) in `root`.
    #[must_use]
    pub const fn new(executor: &'a dyn Executor, root: &'a Path, program: &'a str) -> Self {
        Self {
            executor,
            root,
            program,
        }
    }

    fn logged(&self, args: &[&str], transcript: &mut Transcript) -> Result<ExecResult> {
        run_logged_checked(self.executor, self.root, self.program, args, transcript)
    }

    fn quiet(&self, args: &[&str]) -> Result<ExecResult> {
        let command = format_command(self.program, args);
        self.executor
            .run_in(self.root, self.program, args)?
            .check(&command)
    }

    /// `git fetch origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub fn fetch(&self, transcript: &mut Transcript) -> Result<()> {
        self.logged(&["fetch", REMOTE], transcript).map(|_| ())
    }

    /// `git branch --show-current`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or prints nothing (detached HEAD).
    pub fn current_branch(&self, transcript: &mut Transcript) -> Result<String> {
        let result = run_logged(
            self.executor,
            self.root,
            self.program,
            &["branch", "--show-current"],
            transcript,
        )?;
        let branch = result.stdout.trim();
        if !result.success || branch.is_empty() {
            return Err(DotmanError::Repository(
                "could not determine current branch".to_string(),
            ));
        }
        Ok(branch.to_string())
    }

    /// `git rev-list --left-right --count origin/<branch>...HEAD`.
    ///
    /// Returns `None` when the comparison fails, which happens when no
    /// remote-tracking ref exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error only if git could not be run, timed out, or was
    /// cancelled.
    pub fn divergence(&self, branch: &str, transcript: &mut Transcript) -> Result<Option<Divergence>> {
        let range = format!("{REMOTE}/{branch}...HEAD");
        let result = run_logged(
            self.executor,
            self.root,
            self.program,
            &["rev-list", "--left-right", "--count", &range],
            transcript,
        )?;
        Ok(result
            .success
            .then(|| Divergence::parse(&result.stdout))
            .flatten())
    }

    /// Number of entries in `git status --porcelain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status command fails.
    pub fn pending_changes(&self, transcript: &mut Transcript) -> Result<usize> {
        let result = self.logged(&["status", "--porcelain"], transcript)?;
        Ok(count_entries(&result.stdout))
    }

    /// `git pull --rebase --autostash -X theirs origin <branch>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    pub fn pull(&self, branch: &str, transcript: &mut Transcript) -> Result<()> {
        self.logged(
            &["pull", "--rebase", "--autostash", "-X", "theirs", REMOTE, branch],
            transcript,
        )
        .map(|_| ())
    }

    /// `git add .`.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub fn add_all(&self, transcript: &mut Transcript) -> Result<()> {
        self.logged(&["add", "."], transcript).map(|_| ())
    }

    /// `git commit -m <message>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn commit(&self, message: &str, transcript: &mut Transcript) -> Result<()> {
        self.logged(&["commit", "-m", message], transcript).map(|_| ())
    }

    /// `git push origin <branch>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the push fails.
    pub fn push(&self, branch: &str, transcript: &mut Transcript) -> Result<()> {
        self.logged(&["push", REMOTE, branch], transcript).map(|_| ())
    }

    /// Paths listed by `git status --porcelain` (columns 4 onwards).
    ///
    /// # Errors
    ///
    /// Returns an error if the status command fails.
    pub fn uncommitted_files(&self) -> Result<Vec<String>> {
        let result = self.quiet(&["status", "--porcelain"])?;
        Ok(result
            .stdout
            .lines()
            .filter_map(|line| line.get(3..))
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Discard local changes to `file` with `git checkout HEAD -- <file>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkout fails.
    pub fn reset_file(&self, file: &str, transcript: &mut Transcript) -> Result<()> {
        self.logged(&["checkout", "HEAD", "--", file], transcript)
            .map(|_| ())
    }

    /// Short hash and subject of `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if either query fails (e.g. no commits yet).
    pub fn last_commit(&self) -> Result<CommitInfo> {
        let hash = self.quiet(&["rev-parse", "--short", "HEAD"])?;
        let subject = self.quiet(&["log", "-1", "--pretty=%s"])?;
        Ok(CommitInfo {
            hash: hash.stdout.trim().to_string(),
            subject: subject.stdout.trim().to_string(),
        })
    }

    /// Collect a [`RepoStatus`], optionally fetching from the remote first.
    ///
    /// A failed fetch is not an error; the divergence simply reflects the
    /// last fetched state.
    ///
    /// # Errors
    ///
    /// Returns an error if `git status` fails, or if git could not be run,
    /// timed out, or was cancelled.
    pub fn status(&self, fetch: bool) -> Result<RepoStatus> {
        let pending = count_entries(&self.quiet(&["status", "--porcelain"])?.stdout);

        let branch = self
            .executor
            .run_in(self.root, self.program, &["branch", "--show-current"])?;
        let branch = Some(branch.stdout.trim().to_string())
            .filter(|b| branch.success && !b.is_empty());

        let last_commit = self.last_commit().ok();

        let Some(name) = branch.clone() else {
            return Ok(RepoStatus {
                branch,
                pending,
                divergence: None,
                sync: "Unknown branch".to_string(),
                last_commit,
            });
        };

        if fetch {
            let result = self.executor.run_in(self.root, self.program, &["fetch", REMOTE])?;
            if !result.success {
                tracing::debug!("fetch failed: {}", result.output.trim());
            }
        }

        let range = format!("{REMOTE}/{name}...HEAD");
        let result = self
            .executor
            .run_in(self.root, self.program, &["rev-list", "--left-right", "--count", &range])?;
        let divergence = result
            .success
            .then(|| Divergence::parse(&result.stdout))
            .flatten();
        let sync = divergence.map_or_else(|| "Remote info unavailable".to_string(), Divergence::sync_text);

        Ok(RepoStatus {
            branch,
            pending,
            divergence,
            sync,
            last_commit,
        })
    }
}

fn count_entries(porcelain: &str) -> usize {
    porcelain.lines().filter(|l| !l.trim().is_empty()).count()
}
