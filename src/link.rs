//! Linking packages into the home directory and reversing it.
//!
//! Linking itself is delegated to stow. This module adds conflict recovery
//! (relocate colliding real files into a backup directory, then retry once),
//! package import, and deletion that puts package contents back where they
//! were linked.
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::backup::{Backup, BackupVault};
use crate::conflicts::ConflictPatterns;
use crate::error::{DotmanError, Result};
use crate::exec::CancelToken;
use crate::helpers::{fs, paths};
use crate::layout::Layout;
use crate::stow::Stow;
use crate::transcript::Transcript;

/// How a profile is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeleteMode {
    /// Unlink and restore every package into the home directory, then remove
    /// the profile.
    Restore,
    /// Remove the profile directory without unlinking or restoring anything.
    Destructive,
}

/// Result of linking one package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageLink {
    /// Package name.
    pub package: String,
    /// Backup created to clear conflicts, if any.
    pub backup: Option<BackupSummary>,
}

/// Serializable view of a [`Backup`].
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    /// Backup directory.
    pub dir: PathBuf,
    /// Home-relative paths moved into it.
    pub moved: Vec<String>,
}

impl From<Backup> for BackupSummary {
    fn from(b: Backup) -> Self {
        Self {
            dir: b.dir,
            moved: b.moved,
        }
    }
}

/// Result of importing a path as a package.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Where the content now lives in the repository.
    pub destination: PathBuf,
    /// The link step's result.
    pub link: PackageLink,
}

/// Result of deleting a package.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Package name.
    pub package: String,
    /// Number of files and symlinks moved back into the home directory.
    pub restored: usize,
}

/// Applies and removes package links for one repository and home directory.
#[derive(Debug)]
pub struct LinkEngine<'a> {
    layout: &'a Layout,
    home: &'a Path,
    stow: Stow<'a>,
    patterns: &'a ConflictPatterns,
    cancel: &'a CancelToken,
    vault: BackupVault,
}

impl<'a> LinkEngine<'a> {
    /// Engine linking `layout`'s packages into `home` with `stow`.
    #[must_use]
    pub fn new(
        layout: &'a Layout,
        home: &'a Path,
        stow: Stow<'a>,
        patterns: &'a ConflictPatterns,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            layout,
            home,
            stow,
            patterns,
            cancel,
            vault: BackupVault::new(layout.root()),
        }
    }

    fn check_cancelled(&self, what: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(DotmanError::Cancelled(what.to_string()))
        } else {
            Ok(())
        }
    }

    /// Link every package of `profile` in name order, then record it as the
    /// current profile.
    ///
    /// Stops at the first package that cannot be linked. Packages linked
    /// before it stay linked.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::NotFound`] for an unknown profile, or
    /// [`DotmanError::PartialApply`] naming the failed package and the
    /// packages already applied.
    pub fn apply_profile(&self, profile: &str, transcript: &mut Transcript) -> Result<Vec<PackageLink>> {
        let packages = self.layout.list_packages(profile)?;
        transcript.push(format!("Applying profile '{profile}'..."));

        let mut applied = Vec::with_capacity(packages.len());
        for package in &packages {
            let result = self
                .check_cancelled(&format!("apply profile '{profile}'"))
                .and_then(|()| {
                    transcript.push(format!("Stowing package: {package}"));
                    self.apply_package(profile, package, transcript)
                });
            match result {
                Ok(link) => applied.push(link),
                Err(e) => {
                    return Err(DotmanError::PartialApply {
                        profile: profile.to_string(),
                        package: package.clone(),
                        applied: applied.into_iter().map(|l| l.package).collect(),
                        source: Box::new(e),
                    });
                }
            }
        }

        self.layout.set_current_profile(profile)?;
        transcript.push("Profile applied successfully.");
        Ok(applied)
    }

    /// Link one package, relocating conflicting home content and retrying
    /// once if stow refuses.
    ///
    /// # Errors
    ///
    /// - [`DotmanError::ConflictUnparseable`] if stow reports a conflict but no
    ///   path can be extracted.
    /// - [`DotmanError::Process`] for any other stow failure (nothing is moved).
    /// - [`DotmanError::PartialMutation`] if the retry fails after conflicting
    ///   files were moved to a backup.
    pub fn apply_package(&self, profile: &str, package: &str, transcript: &mut Transcript) -> Result<PackageLink> {
        self.layout.existing_package(profile, package)?;
        let profile_dir = self.layout.profile_dir(profile);

        let first = self.stow.link(&profile_dir, self.home, package, transcript)?;
        if first.success {
            return Ok(PackageLink {
                package: package.to_string(),
                backup: None,
            });
        }

        let conflicts = self.patterns.parse(&first.output);
        if conflicts.is_empty() {
            if self.patterns.looks_like_conflict(&first.output) {
                return Err(DotmanError::ConflictUnparseable {
                    package: package.to_string(),
                    output: first.output,
                });
            }
            return Err(DotmanError::Process {
                command: self.stow.describe(&profile_dir, self.home, package, false),
                code: first.code,
                output: first.output,
            });
        }

        transcript.push(format!("Conflicts in {package}. Resolving..."));
        let backup = self
            .vault
            .relocate(profile, package, self.home, &conflicts, transcript)?;

        transcript.push("Retrying stow...");
        let second = self.stow.link(&profile_dir, self.home, package, transcript)?;
        if !second.success {
            return Err(DotmanError::PartialMutation {
                operation: format!("apply package '{package}'"),
                detail: format!(
                    "conflicting files were moved to {} but stow still failed ({}):\n{}",
                    backup.dir.display(),
                    second.exit_description(),
                    second.output.trim()
                ),
            });
        }

        Ok(PackageLink {
            package: package.to_string(),
            backup: Some(backup.into()),
        })
    }

    /// Move `source` (a path under the home directory) into
    /// `<profile>/<package>/<home-relative path>` and link the package.
    ///
    /// Every check runs before anything is touched. After the copy succeeds
    /// the original is deleted and the package is linked; a failure from that
    /// point on is reported as [`DotmanError::PartialMutation`].
    ///
    /// # Errors
    ///
    /// - [`DotmanError::NotFound`] if the profile does not exist.
    /// - [`DotmanError::PathValidation`] if the package name is invalid, the
    ///   source is missing or outside home, overlaps the repository, or the
    ///   destination already exists.
    pub fn import_package(
        &self,
        profile: &str,
        package: &str,
        source: &str,
        cwd: &Path,
        transcript: &mut Transcript,
    ) -> Result<ImportReport> {
        self.layout.existing_profile(profile)?;
        paths::validate_name("package", package)?;
        if package.starts_with('.') {
            return Err(DotmanError::PathValidation(format!(
                "package name '{package}' must not be hidden"
            )));
        }
        let source = paths::expand_path(source, self.home, cwd)?;
        let rel = paths::home_relative(&source, self.home)?;
        let content = paths::resolve_outside_repository(&source, self.layout.root())?;
        let package_dir = self.layout.package_dir(profile, package);
        let destination = package_dir.join(&rel);
        if fs::exists_no_follow(&destination) {
            return Err(DotmanError::PathValidation(format!(
                "destination already exists: {}",
                destination.display()
            )));
        }

        let fresh_package = !fs::exists_no_follow(&package_dir);

        transcript.push(format!(
            "Copying {} to {}...",
            source.display(),
            destination.display()
        ));
        if let Err(e) = fs::copy_path(&content, &destination) {
            let partial_copy = if fresh_package { &package_dir } else { &destination };
            discard_partial_copy(partial_copy, transcript);
            return Err(DotmanError::io(
                format!("copy {} to {}", source.display(), destination.display()),
                e,
            ));
        }

        let partial = |detail: String| DotmanError::PartialMutation {
            operation: format!("import into '{profile}/{package}'"),
            detail,
        };

        transcript.push(format!("Deleting original {}...", source.display()));
        fs::remove_path(&source).map_err(|e| {
            partial(format!(
                "copied to {} but the original at {} could not be deleted: {e:#}",
                destination.display(),
                source.display()
            ))
        })?;

        transcript.push(format!("Stowing package {package}..."));
        let link = self.apply_package(profile, package, transcript).map_err(|e| {
            partial(format!(
                "content moved to {} but linking failed, so {} is not linked: {e}",
                destination.display(),
                source.display()
            ))
        })?;

        Ok(ImportReport { destination, link })
    }

    /// Unlink a package, move its contents back to the mirrored home paths,
    /// and remove the package directory.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::Process`] if unlinking fails (nothing else is
    /// touched), or [`DotmanError::PartialMutation`] for any failure after the
    /// unlink.
    pub fn delete_package(&self, profile: &str, package: &str, transcript: &mut Transcript) -> Result<RestoreReport> {
        let package_dir = self.layout.existing_package(profile, package)?;
        let profile_dir = self.layout.profile_dir(profile);

        transcript.push(format!("Unstowing {package}..."));
        let result = self.stow.unlink(&profile_dir, self.home, package, transcript)?;
        if !result.success {
            return Err(DotmanError::Process {
                command: self.stow.describe(&profile_dir, self.home, package, true),
                code: result.code,
                output: result.output,
            });
        }

        let partial = |detail: String| DotmanError::PartialMutation {
            operation: format!("delete package '{profile}/{package}'"),
            detail,
        };

        transcript.push("Restoring files to original location...");
        let mut restored = 0;
        restore_tree(&package_dir, self.home, &mut restored, transcript).map_err(|e| {
            partial(format!(
                "unlinked, but restoring into {} stopped after {restored} item(s): {e}",
                self.home.display()
            ))
        })?;

        fs::remove_path(&package_dir).map_err(|e| {
            partial(format!(
                "restored {restored} item(s) but {} could not be removed: {e:#}",
                package_dir.display()
            ))
        })?;
        transcript.push(format!("Package {package} deleted"));

        Ok(RestoreReport {
            package: package.to_string(),
            restored,
        })
    }

    /// Delete a profile.
    ///
    /// In [`DeleteMode::Restore`] every package is deleted with
    /// [`delete_package`](Self::delete_package) first, stopping at the first
    /// failure. The current-profile marker is cleared if it names this
    /// profile.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::NotFound`] for an unknown profile or the first
    /// package failure in restore mode.
    pub fn delete_profile(&self, profile: &str, mode: DeleteMode, transcript: &mut Transcript) -> Result<Vec<RestoreReport>> {
        let dir = self.layout.existing_profile(profile)?;
        let mut reports = Vec::new();
        if mode == DeleteMode::Restore {
            for package in self.layout.list_packages(profile)? {
                self.check_cancelled(&format!("delete profile '{profile}'"))?;
                reports.push(self.delete_package(profile, &package, transcript)?);
            }
        }

        transcript.push(format!("Removing profile directory {}...", dir.display()));
        fs::remove_path(&dir).map_err(|e| DotmanError::io(format!("remove {}", dir.display()), e))?;
        self.layout.clear_current_profile_if(profile)?;
        transcript.push(format!("Profile '{profile}' deleted"));
        Ok(reports)
    }
}

/// Remove what a failed copy left at `path`, noting a failed cleanup.
pub(crate) fn discard_partial_copy(path: &Path, transcript: &mut Transcript) {
    if !fs::exists_no_follow(path) {
        return;
    }
    if let Err(e) = fs::remove_path(path) {
        tracing::warn!("could not remove partial copy {}: {e:#}", path.display());
        transcript.push(format!(
            "Could not remove partial copy {}: {e:#}",
            path.display()
        ));
    }
}

/// Move every file and symlink under `src` to the same relative path under
/// `dst`, creating directories as needed. Existing content at a destination
/// is never overwritten.
fn restore_tree(src: &Path, dst: &Path, restored: &mut usize, transcript: &mut Transcript) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(src)
        .and_then(|e| e.collect::<std::io::Result<Vec<_>>>())
        .map_err(|e| DotmanError::io(format!("read {}", src.display()), e))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if fs::is_real_dir(&from) {
            if fs::exists_no_follow(&to) && !fs::is_real_dir(&to) {
                return Err(DotmanError::PathValidation(format!(
                    "{} exists and is not a directory",
                    to.display()
                )));
            }
            std::fs::create_dir_all(&to)
                .map_err(|e| DotmanError::io(format!("create {}", to.display()), e))?;
            restore_tree(&from, &to, restored, transcript)?;
        } else {
            if fs::exists_no_follow(&to) {
                return Err(DotmanError::PathValidation(format!(
                    "{} already exists; refusing to overwrite",
                    to.display()
                )));
            }
            fs::move_path(&from, &to)
                .map_err(|e| DotmanError::io(format!("restore {}", to.display()), e))?;
            *restored += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::ScriptedExecutor;

    struct Fixture {
        root: tempfile::TempDir,
        home: tempfile::TempDir,
        layout: Layout,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let home = tempfile::tempdir().unwrap();
            let layout = Layout::new(root.path(), &[]);
            layout.create_profile("laptop").unwrap();
            std::fs::create_dir_all(layout.package_dir("laptop", "bash")).unwrap();
            std::fs::write(layout.package_dir("laptop", "bash").join(".bashrc"), b"new").unwrap();
            Self { root, home, layout }
        }

        fn link_cmd(&self) -> String {
            format!(
                "stow -v -d {} -t {} bash",
                self.layout.profile_dir("laptop").display(),
                self.home.path().display()
            )
        }

        fn unlink_cmd(&self) -> String {
            format!(
                "stow -v -D -d {} -t {} bash",
                self.layout.profile_dir("laptop").display(),
                self.home.path().display()
            )
        }

        fn run<T>(&self, exec: &ScriptedExecutor, f: impl FnOnce(&LinkEngine<'_>, &mut Transcript) -> T) -> (T, Transcript) {
            let patterns = ConflictPatterns::default();
            let cancel = CancelToken::new();
            let engine = LinkEngine::new(
                &self.layout,
                self.home.path(),
                Stow::new(exec, "stow"),
                &patterns,
                &cancel,
            );
            let mut transcript = Transcript::new();
            let out = f(&engine, &mut transcript);
            (out, transcript)
        }
    }

    #[test]
    fn clean_link_records_current_profile() {
        let fx = Fixture::new();
        let exec = ScriptedExecutor::new().ok(&fx.link_cmd(), "LINK: .bashrc => laptop/bash/.bashrc");
        let (result, transcript) = fx.run(&exec, |e, t| e.apply_profile("laptop", t));
        let links = result.unwrap();
        assert_eq!(links.len(), 1);
        assert!(links[0].backup.is_none());
        assert_eq!(fx.layout.current_profile().unwrap().as_deref(), Some("laptop"));
        assert!(transcript.contains("Profile applied successfully."));
    }

    #[test]
    fn conflict_is_backed_up_and_retried() {
        let fx = Fixture::new();
        std::fs::write(fx.home.path().join(".bashrc"), b"old").unwrap();
        let exec = ScriptedExecutor::new()
            .fail(
                &fx.link_cmd(),
                "WARNING! stowing bash would cause conflicts:\n  * existing target is neither a link nor a directory: .bashrc\nAll operations aborted.\n",
            )
            .ok(&fx.link_cmd(), "");
        let (result, transcript) = fx.run(&exec, |e, t| e.apply_package("laptop", "bash", t));
        let link = result.unwrap();
        let backup = link.backup.unwrap();
        assert_eq!(backup.moved, vec![".bashrc"]);
        assert_eq!(std::fs::read(backup.dir.join(".bashrc")).unwrap(), b"old");
        assert!(!fx.home.path().join(".bashrc").exists());
        assert_eq!(exec.calls().len(), 2);
        assert!(transcript.contains("Retrying stow..."));
    }

    #[test]
    fn unparseable_conflict_is_reported() {
        let fx = Fixture::new();
        let exec = ScriptedExecutor::new().fail(
            &fx.link_cmd(),
            "WARNING! stowing bash would cause conflicts:\nAll operations aborted.\n",
        );
        let (result, _) = fx.run(&exec, |e, t| e.apply_package("laptop", "bash", t));
        assert!(matches!(result.unwrap_err(), DotmanError::ConflictUnparseable { .. }));
        assert_eq!(exec.calls().len(), 1);
        assert!(!fx.root.path().join("backups").exists());
    }

    #[test]
    fn other_failure_is_fatal_without_backup() {
        let fx = Fixture::new();
        let exec = ScriptedExecutor::new().fail(&fx.link_cmd(), "stow: ERROR: permission denied");
        let (result, _) = fx.run(&exec, |e, t| e.apply_package("laptop", "bash", t));
        let err = result.unwrap_err();
        assert!(matches!(err, DotmanError::Process { .. }));
        assert!(err.to_string().contains("permission denied"));
        assert!(!fx.root.path().join("backups").exists());
    }

    #[test]
    fn second_failure_is_partial_mutation_with_raw_output() {
        let fx = Fixture::new();
        std::fs::write(fx.home.path().join(".bashrc"), b"old").unwrap();
        let exec = ScriptedExecutor::new()
            .fail(&fx.link_cmd(), "  * existing target is not owned by stow: .bashrc\n")
            .fail(&fx.link_cmd(), "stow: ERROR: still broken");
        let (result, _) = fx.run(&exec, |e, t| e.apply_package("laptop", "bash", t));
        let err = result.unwrap_err();
        assert!(matches!(err, DotmanError::PartialMutation { .. }));
        assert!(err.to_string().contains("still broken"));
        assert_eq!(exec.calls().len(), 2);
    }

    #[test]
    fn apply_profile_failure_names_package() {
        let fx = Fixture::new();
        let exec = ScriptedExecutor::new().fail(&fx.link_cmd(), "stow: ERROR: boom");
        let (result, _) = fx.run(&exec, |e, t| e.apply_profile("laptop", t));
        match result.unwrap_err() {
            DotmanError::PartialApply { package, applied, .. } => {
                assert_eq!(package, "bash");
                assert!(applied.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.layout.current_profile().unwrap(), None);
    }

    #[test]
    fn import_outside_home_mutates_nothing() {
        let fx = Fixture::new();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("file"), b"x").unwrap();
        let exec = ScriptedExecutor::new();
        let source = outside.path().join("file");
        let (result, _) = fx.run(&exec, |e, t| {
            e.import_package("laptop", "misc", &source.to_string_lossy(), Path::new("/"), t)
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains("source outside HOME"));
        assert!(source.exists());
        assert!(!fx.layout.package_dir("laptop", "misc").exists());
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn import_rejects_existing_destination() {
        let fx = Fixture::new();
        std::fs::write(fx.home.path().join(".bashrc"), b"mine").unwrap();
        let exec = ScriptedExecutor::new();
        let (result, _) = fx.run(&exec, |e, t| {
            e.import_package("laptop", "bash", "~/.bashrc", Path::new("/"), t)
        });
        assert!(matches!(result.unwrap_err(), DotmanError::PathValidation(_)));
        assert_eq!(std::fs::read(fx.home.path().join(".bashrc")).unwrap(), b"mine");
    }

    #[test]
    fn import_link_failure_is_partial_mutation() {
        let fx = Fixture::new();
        std::fs::write(fx.home.path().join(".vimrc"), b"set nu").unwrap();
        let exec = ScriptedExecutor::new();
        let (result, _) = fx.run(&exec, |e, t| {
            e.import_package("laptop", "vim", "~/.vimrc", Path::new("/"), t)
        });
        let err = result.unwrap_err();
        assert!(matches!(err, DotmanError::PartialMutation { .. }));
        let dest = fx.layout.package_dir("laptop", "vim").join(".vimrc");
        assert_eq!(std::fs::read(dest).unwrap(), b"set nu");
        assert!(!fx.home.path().join(".vimrc").exists());
    }

    #[test]
    fn delete_package_unlink_failure_restores_nothing() {
        let fx = Fixture::new();
        let exec = ScriptedExecutor::new().fail(&fx.unlink_cmd(), "stow: ERROR");
        let (result, _) = fx.run(&exec, |e, t| e.delete_package("laptop", "bash", t));
        assert!(matches!(result.unwrap_err(), DotmanError::Process { .. }));
        assert!(fx.layout.package_dir("laptop", "bash").join(".bashrc").exists());
        assert!(!fx.home.path().join(".bashrc").exists());
    }

    #[test]
    fn delete_package_moves_contents_home() {
        let fx = Fixture::new();
        let pkg = fx.layout.package_dir("laptop", "bash");
        std::fs::create_dir_all(pkg.join(".config/bash")).unwrap();
        std::fs::write(pkg.join(".config/bash/aliases"), b"alias ll=ls").unwrap();
        let exec = ScriptedExecutor::new().ok(&fx.unlink_cmd(), "");
        let (result, _) = fx.run(&exec, |e, t| e.delete_package("laptop", "bash", t));
        assert_eq!(result.unwrap().restored, 2);
        assert_eq!(std::fs::read(fx.home.path().join(".bashrc")).unwrap(), b"new");
        assert_eq!(
            std::fs::read(fx.home.path().join(".config/bash/aliases")).unwrap(),
            b"alias ll=ls"
        );
        assert!(!pkg.exists());
    }

    #[test]
    fn delete_package_refuses_to_overwrite() {
        let fx = Fixture::new();
        std::fs::write(fx.home.path().join(".bashrc"), b"someone else's").unwrap();
        let exec = ScriptedExecutor::new().ok(&fx.unlink_cmd(), "");
        let (result, _) = fx.run(&exec, |e, t| e.delete_package("laptop", "bash", t));
        assert!(matches!(result.unwrap_err(), DotmanError::PartialMutation { .. }));
        assert_eq!(std::fs::read(fx.home.path().join(".bashrc")).unwrap(), b"someone else's");
        assert!(fx.layout.package_dir("laptop", "bash").join(".bashrc").exists());
    }

    #[test]
    fn destructive_delete_runs_no_commands() {
        let fx = Fixture::new();
        fx.layout.set_current_profile("laptop").unwrap();
        let exec = ScriptedExecutor::new();
        let (result, _) = fx.run(&exec, |e, t| e.delete_profile("laptop", DeleteMode::Destructive, t));
        result.unwrap();
        assert!(exec.calls().is_empty());
        assert!(!fx.layout.profile_dir("laptop").exists());
        assert_eq!(fx.layout.current_profile().unwrap(), None);
    }

    #[test]
    fn restore_delete_restores_each_package() {
        let fx = Fixture::new();
        let exec = ScriptedExecutor::new().ok(&fx.unlink_cmd(), "");
        let (result, _) = fx.run(&exec, |e, t| e.delete_profile("laptop", DeleteMode::Restore, t));
        let reports = result.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(fx.home.path().join(".bashrc").exists());
        assert!(!fx.layout.profile_dir("laptop").exists());
    }
}
