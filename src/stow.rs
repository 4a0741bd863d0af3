//! Invocation of GNU stow for linking and unlinking packages.
use std::path::Path;

use crate::error::Result;
use crate::exec::{ExecResult, Executor, run_logged};
use crate::transcript::Transcript;

/// Thin wrapper over the `stow` program.
#[derive(Debug, Clone, Copy)]
pub struct Stow<'a> {
    executor: &'a dyn Executor,
    program: &'a str,
}

impl<'a> Stow<'a> {
    /// Wrap `program` (usually `stow`) run through `executor`.
    #[must_use]
    pub const fn new(executor: &'a dyn Executor, program: &'a str) -> Self {
        Self { executor, program }
    }

    /// `stow -v -d <profile_dir> -t <home> <package>`.
    ///
    /// The result is returned on non-zero exit so conflicts can be parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if stow could not be run, timed out, or was cancelled.
    pub fn link(
        &self,
        profile_dir: &Path,
        home: &Path,
        package: &str,
        transcript: &mut Transcript,
    ) -> Result<ExecResult> {
        let dir = profile_dir.to_string_lossy();
        let target = home.to_string_lossy();
        run_logged(
            self.executor,
            profile_dir,
            self.program,
            &["-v", "-d", &dir, "-t", &target, package],
            transcript,
        )
    }

    /// `stow -v -D -d <profile_dir> -t <home> <package>`.
    ///
    /// # Errors
    ///
    /// Returns an error if stow could not be run, timed out, or was cancelled.
    pub fn unlink(
        &self,
        profile_dir: &Path,
        home: &Path,
        package: &str,
        transcript: &mut Transcript,
    ) -> Result<ExecResult> {
        let dir = profile_dir.to_string_lossy();
        let target = home.to_string_lossy();
        run_logged(
            self.executor,
            profile_dir,
            self.program,
            &["-v", "-D", "-d", &dir, "-t", &target, package],
            transcript,
        )
    }

    /// Command line shown in errors for a link attempt.
    #[must_use]
    pub fn describe(&self, profile_dir: &Path, home: &Path, package: &str, unlink: bool) -> String {
        format!(
            "{} -v{} -d {} -t {} {package}",
            self.program,
            if unlink { " -D" } else { "" },
            profile_dir.display(),
            home.display()
        )
    }
}
