//! Relocation of conflicting home content into `backups/`.
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{DotmanError, Result};
use crate::helpers::{fs, paths};
use crate::transcript::Transcript;

/// Name of the backup directory under the repository root.
pub const BACKUPS_DIR: &str = "backups";

/// A backup directory and the relative paths moved into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    /// Absolute path of the backup directory.
    pub dir: PathBuf,
    /// Home-relative paths that were moved, in the order they were moved.
    pub moved: Vec<String>,
}

/// Creates backup directories under `<root>/backups`.
#[derive(Debug, Clone)]
pub struct BackupVault {
    base: PathBuf,
}

impl BackupVault {
    /// Vault rooted at `<root>/backups`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            base: root.join(BACKUPS_DIR),
        }
    }

    /// Create a fresh directory named `<profile>_<package>_<unix timestamp>`,
    /// suffixed `_<n>` when that name is already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create_dir(&self, profile: &str, package: &str) -> Result<PathBuf> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        std::fs::create_dir_all(&self.base)
            .map_err(|e| DotmanError::io(format!("create {}", self.base.display()), e))?;

        let stem = format!("{profile}_{package}_{ts}");
        let mut candidate = self.base.join(&stem);
        let mut n = 1u32;
        loop {
            match std::fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = self.base.join(format!("{stem}_{n}"));
                    n += 1;
                }
                Err(e) => {
                    return Err(DotmanError::io(
                        format!("create backup directory {}", candidate.display()),
                        e,
                    ));
                }
            }
        }
    }

    /// Move each conflicting `{home}/{path}` into a new backup directory,
    /// preserving its relative path.
    ///
    /// All paths are validated before anything is moved. Repeated paths are
    /// moved once. Paths that no longer exist are skipped with a transcript
    /// note.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::PathValidation`] if a path is absolute or
    /// escapes `home`, an I/O error if the first move fails, or
    /// [`DotmanError::PartialMutation`] naming the backup directory and the
    /// paths already moved if a later move fails.
    pub fn relocate(
        &self,
        profile: &str,
        package: &str,
        home: &Path,
        conflicts: &[String],
        transcript: &mut Transcript,
    ) -> Result<Backup> {
        let mut unique: Vec<&String> = Vec::with_capacity(conflicts.len());
        for path in conflicts {
            paths::ensure_contained(Path::new(path))?;
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        let dir = self.create_dir(profile, package)?;
        transcript.push(format!("Backup directory: {}", dir.display()));

        let mut moved = Vec::with_capacity(unique.len());
        for rel in unique {
            let src = home.join(rel);
            if !fs::exists_no_follow(&src) {
                transcript.push(format!("Skipping {rel}: no longer present"));
                continue;
            }
            transcript.push(format!("Backing up {rel}"));
            if let Err(e) = fs::move_path(&src, &dir.join(rel)) {
                if moved.is_empty() {
                    return Err(DotmanError::io(format!("backup {}", src.display()), e));
                }
                return Err(DotmanError::PartialMutation {
                    operation: format!("back up conflicts of '{package}'"),
                    detail: format!(
                        "moved {} into {} but {rel} could not be moved: {e:#}",
                        moved.join(", "),
                        dir.display()
                    ),
                });
            }
            moved.push(rel.clone());
        }
        Ok(Backup { dir, moved })
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    #[test]
    fn create_dir_suffixes_taken_names() {
        let root = tempfile::tempdir().unwrap();
        let vault = BackupVault::new(root.path());
        let first = vault.create_dir("laptop", "bash").unwrap();
        let second = vault.create_dir("laptop", "bash").unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(second.is_dir());
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("laptop_bash_"));
    }

    #[test]
    fn relocate_preserves_relative_structure() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".bashrc"), b"old bashrc").unwrap();
        std::fs::create_dir_all(home.path().join(".config")).unwrap();
        std::fs::write(home.path().join(".config/x"), b"old x").unwrap();

        let vault = BackupVault::new(root.path());
        let mut transcript = Transcript::new();
        let conflicts = vec![".bashrc".to_string(), ".config/x".to_string()];
        let backup = vault
            .relocate("laptop", "bash", home.path(), &conflicts, &mut transcript)
            .unwrap();

        assert_eq!(backup.moved, conflicts);
        assert!(backup.dir.starts_with(root.path().join(BACKUPS_DIR)));
        assert_eq!(std::fs::read(backup.dir.join(".bashrc")).unwrap(), b"old bashrc");
        assert_eq!(std::fs::read(backup.dir.join(".config/x")).unwrap(), b"old x");
        assert!(!home.path().join(".bashrc").exists());
        assert!(home.path().join(".config").is_dir());
        assert!(transcript.contains("Backing up .config/x"));
    }

    #[test]
    fn relocate_moves_duplicates_once() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".vimrc"), b"v").unwrap();
        let vault = BackupVault::new(root.path());
        let conflicts = vec![".vimrc".to_string(), ".vimrc".to_string()];
        let backup = vault
            .relocate("p", "vim", home.path(), &conflicts, &mut Transcript::new())
            .unwrap();
        assert_eq!(backup.moved, vec![".vimrc"]);
    }

    #[test]
    fn relocate_rejects_escaping_paths_before_moving() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".vimrc"), b"v").unwrap();
        let vault = BackupVault::new(root.path());
        let conflicts = vec![".vimrc".to_string(), "../outside".to_string()];
        let err = vault
            .relocate("p", "vim", home.path(), &conflicts, &mut Transcript::new())
            .unwrap_err();
        assert!(matches!(err, DotmanError::PathValidation(_)));
        assert!(home.path().join(".vimrc").exists());
        assert!(!root.path().join(BACKUPS_DIR).exists());
    }

    #[test]
    fn failed_move_after_earlier_moves_is_partial_mutation() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".config")).unwrap();
        std::fs::write(home.path().join(".config/x"), b"x").unwrap();
        std::fs::write(home.path().join(".config/y"), b"y").unwrap();

        // `.config/x` creates `<backup>/.config`, so moving `.config` itself
        // onto it fails.
        let vault = BackupVault::new(root.path());
        let conflicts = vec![".config/x".to_string(), ".config".to_string()];
        let err = vault
            .relocate("laptop", "cfg", home.path(), &conflicts, &mut Transcript::new())
            .unwrap_err();

        let DotmanError::PartialMutation { detail, .. } = err else {
            panic!("expected a partial mutation, got {err:?}");
        };
        assert!(detail.contains(".config/x"), "{detail}");
        assert!(detail.contains(BACKUPS_DIR), "{detail}");
        assert!(home.path().join(".config/y").exists());
        assert!(!home.path().join(".config/x").exists());
    }
}
