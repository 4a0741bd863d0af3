//! Smart sync: reconcile the local working copy with `origin`.
//!
//! ```text
//! Fetch ──▶ Check ──┬──▶ Pull ──▶ Push ──▶ Done
//!                   ├──▶ Push ──▶ Done
//!                   └──▶ Done
//! any failure ──▶ Error
//! ```
//!
//! `Check` compares `origin/<branch>` with `HEAD`. Being behind always pulls
//! and then pushes; being ahead or having uncommitted changes pushes (after an
//! auto-commit); otherwise the sync is a no-op. When the remote-tracking ref
//! does not exist yet the comparison fails and the branch is pushed.
use serde::Serialize;

use crate::error::{DotmanError, Result};
use crate::exec::CancelToken;
use crate::git::{Divergence, Git, RepoStatus};
use crate::transcript::Transcript;

/// A step of the sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// `git fetch origin`.
    Fetch,
    /// Determine branch, divergence and pending changes.
    Check,
    /// Rebase onto the remote branch.
    Pull,
    /// Auto-commit pending changes and push.
    Push,
    /// Terminal success.
    Done,
    /// Terminal failure.
    Error,
}

impl SyncState {
    /// Whether no further steps follow.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Summary of a completed sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Branch that was synced.
    pub branch: String,
    /// Divergence observed in `Check`; `None` when the remote branch did not
    /// exist yet.
    pub divergence: Option<Divergence>,
    /// Whether an auto-commit was created.
    pub committed: bool,
    /// States visited, in order, ending with `Done`.
    pub states: Vec<SyncState>,
    /// Repository status after the sync, when it could be read.
    pub status: Option<RepoStatus>,
}

/// Drives one sync invocation.
#[derive(Debug)]
pub struct SyncEngine<'a> {
    git: Git<'a>,
    cancel: &'a CancelToken,
    commit_message: &'a str,
    state: SyncState,
    states: Vec<SyncState>,
    branch: Option<String>,
    divergence: Option<Divergence>,
    committed: bool,
    error: Option<DotmanError>,
}

impl<'a> SyncEngine<'a> {
    /// A machine positioned at `Fetch`.
    #[must_use]
    pub fn new(git: Git<'a>, cancel: &'a CancelToken, commit_message: &'a str) -> Self {
        Self {
            git,
            cancel,
            commit_message,
            state: SyncState::Fetch,
            states: vec![SyncState::Fetch],
            branch: None,
            divergence: None,
            committed: false,
            error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// States visited so far.
    #[must_use]
    pub fn states(&self) -> &[SyncState] {
        &self.states
    }

    /// Execute the current state and move to the next one.
    ///
    /// The cancel token is checked before any work is done; a cancelled or
    /// failed step moves the machine to `Error`. Terminal states are left
    /// unchanged.
    pub fn step(&mut self, transcript: &mut Transcript) -> SyncState {
        if self.state.is_terminal() {
            return self.state;
        }
        let next = if self.cancel.is_cancelled() {
            Err(DotmanError::Cancelled(format!("sync cancelled before {:?}", self.state)))
        } else {
            self.execute(transcript)
        };
        let next = next.unwrap_or_else(|e| {
            transcript.push(format!("Error: {e}"));
            self.error = Some(e);
            SyncState::Error
        });
        self.state = next;
        self.states.push(next);
        next
    }

    fn execute(&mut self, transcript: &mut Transcript) -> Result<SyncState> {
        match self.state {
            SyncState::Fetch => {
                self.git.fetch(transcript)?;
                Ok(SyncState::Check)
            }
            SyncState::Check => self.check(transcript),
            SyncState::Pull => {
                transcript.push("Pulling changes...");
                self.git.pull(self.branch()?, transcript)?;
                Ok(SyncState::Push)
            }
            SyncState::Push => {
                self.push(transcript)?;
                Ok(SyncState::Done)
            }
            SyncState::Done | SyncState::Error => Ok(self.state),
        }
    }

    fn check(&mut self, transcript: &mut Transcript) -> Result<SyncState> {
        let branch = self.git.current_branch(transcript)?;
        let divergence = self.git.divergence(&branch, transcript)?;
        let pending = self.git.pending_changes(transcript)?;
        self.branch = Some(branch);
        self.divergence = divergence;

        let Some(d) = divergence else {
            transcript.push("Remote branch not found; publishing local branch");
            return Ok(SyncState::Push);
        };
        transcript.push(format!(
            "Status: Behind {}, Ahead {}, Pending {pending}",
            d.behind, d.ahead
        ));
        Ok(if d.behind > 0 {
            SyncState::Pull
        } else if d.ahead > 0 || pending > 0 {
            SyncState::Push
        } else {
            transcript.push("Already up to date");
            SyncState::Done
        })
    }

    fn push(&mut self, transcript: &mut Transcript) -> Result<()> {
        let branch = self.branch()?.to_string();
        if self.git.pending_changes(transcript)? > 0 {
            transcript.push("Committing pending changes...");
            self.git.add_all(transcript)?;
            self.git.commit(self.commit_message, transcript)?;
            self.committed = true;
        }
        transcript.push("Pushing changes...");
        self.git.push(&branch, transcript)
    }

    fn branch(&self) -> Result<&str> {
        self.branch
            .as_deref()
            .ok_or_else(|| DotmanError::Repository("could not determine current branch".to_string()))
    }

    /// Step until a terminal state is reached.
    ///
    /// On success the repository status is refreshed and returned with the
    /// report.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing step.
    pub fn run(mut self, transcript: &mut Transcript) -> Result<SyncReport> {
        while !self.step(transcript).is_terminal() {}
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        transcript.push("Sync complete");
        let status = match self.git.status(false) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!("status refresh after sync failed: {e}");
                None
            }
        };
        Ok(SyncReport {
            branch: self.branch.unwrap_or_default(),
            divergence: self.divergence,
            committed: self.committed,
            states: self.states,
            status,
        })
    }
}
