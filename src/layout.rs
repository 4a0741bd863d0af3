//! Repository layout: profiles, packages, storage entries and the
//! current-profile marker.
//!
//! Nothing is cached; every listing re-reads the filesystem and is sorted by
//! name.
use std::path::{Path, PathBuf};

use crate::error::{DotmanError, Result};
use crate::helpers::paths;

/// Directory holding storage items.
pub const STORAGE_DIR: &str = "storage";

/// Manifest recording where storage items came from.
pub const STORAGE_MANIFEST: &str = ".dotman_manifest.toml";

/// Marker naming the last applied profile.
pub const CURRENT_PROFILE_FILE: &str = ".current_profile";

/// Top-level names that are never profiles.
pub const RESERVED_NAMES: &[&str] = &[
    "dotman",
    "storage",
    "backups",
    ".dotman_venv",
    ".gemini",
    ".git",
    "venv",
    "node_modules",
];

/// Scaffolding seeded into every new profile.
const PROFILE_SCAFFOLD: &[&str] = &[".config", ".local/bin"];

/// View of a dotfiles repository rooted at `root`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    exclude: Vec<String>,
}

impl Layout {
    /// Layout for `root`, with extra profile exclusions.
    #[must_use]
    pub fn new(root: &Path, exclude: &[String]) -> Self {
        Self {
            root: root.to_path_buf(),
            exclude: exclude.to_vec(),
        }
    }

    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `profile`.
    #[must_use]
    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.root.join(profile)
    }

    /// Directory of `package` inside `profile`.
    #[must_use]
    pub fn package_dir(&self, profile: &str, package: &str) -> PathBuf {
        self.root.join(profile).join(package)
    }

    /// `<root>/storage`.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    fn is_excluded(&self, name: &str) -> bool {
        name.starts_with('.')
            || RESERVED_NAMES.contains(&name)
            || self.exclude.iter().any(|e| e == name)
    }

    /// Profile names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read.
    pub fn list_profiles(&self) -> Result<Vec<String>> {
        let mut names = sub_dirs(&self.root)?;
        names.retain(|n| !self.is_excluded(n));
        Ok(names)
    }

    /// Package names of `profile`, sorted. Hidden directories are scaffolding,
    /// not packages.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::NotFound`] if the profile does not exist.
    pub fn list_packages(&self, profile: &str) -> Result<Vec<String>> {
        let dir = self.existing_profile(profile)?;
        let mut names = sub_dirs(&dir)?;
        names.retain(|n| !n.starts_with('.'));
        Ok(names)
    }

    /// Top-level entries of `storage/`, sorted, directories suffixed with `/`.
    /// The directory is created if missing; the manifest is not listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read.
    pub fn list_storage_items(&self) -> Result<Vec<String>> {
        let dir = self.storage_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| DotmanError::io(format!("create {}", dir.display()), e))?;
        let mut items = Vec::new();
        for entry in read_dir(&dir)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == STORAGE_MANIFEST {
                continue;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            items.push(if is_dir { format!("{name}/") } else { name });
        }
        items.sort();
        Ok(items)
    }

    /// The profile named in `.current_profile`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read.
    pub fn current_profile(&self) -> Result<Option<String>> {
        let path = self.root.join(CURRENT_PROFILE_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DotmanError::io(format!("read {}", path.display()), e)),
        }
    }

    /// Overwrite `.current_profile` with `profile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn set_current_profile(&self, profile: &str) -> Result<()> {
        let path = self.root.join(CURRENT_PROFILE_FILE);
        std::fs::write(&path, format!("{profile}\n"))
            .map_err(|e| DotmanError::io(format!("write {}", path.display()), e))
    }

    /// Remove `.current_profile` if it names `profile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read or removed.
    pub fn clear_current_profile_if(&self, profile: &str) -> Result<()> {
        if self.current_profile()?.as_deref() == Some(profile) {
            let path = self.root.join(CURRENT_PROFILE_FILE);
            std::fs::remove_file(&path)
                .map_err(|e| DotmanError::io(format!("remove {}", path.display()), e))?;
        }
        Ok(())
    }

    /// Create a profile directory seeded with `.config` and `.local/bin`.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::PathValidation`] if the name is invalid,
    /// reserved, hidden, or already exists.
    pub fn create_profile(&self, name: &str) -> Result<PathBuf> {
        paths::validate_name("profile", name)?;
        if self.is_excluded(name) {
            return Err(DotmanError::PathValidation(format!(
                "profile name '{name}' is reserved"
            )));
        }
        let dir = self.profile_dir(name);
        if dir.symlink_metadata().is_ok() {
            return Err(DotmanError::PathValidation(format!(
                "profile '{name}' already exists"
            )));
        }
        std::fs::create_dir(&dir)
            .map_err(|e| DotmanError::io(format!("create {}", dir.display()), e))?;
        for sub in PROFILE_SCAFFOLD {
            let path = dir.join(sub);
            std::fs::create_dir_all(&path)
                .map_err(|e| DotmanError::io(format!("create {}", path.display()), e))?;
        }
        Ok(dir)
    }

    /// Directory of an existing profile.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::NotFound`] if the name is not a profile.
    pub fn existing_profile(&self, profile: &str) -> Result<PathBuf> {
        let not_found = || DotmanError::NotFound {
            kind: "profile",
            name: profile.to_string(),
        };
        if paths::validate_name("profile", profile).is_err() || self.is_excluded(profile) {
            return Err(not_found());
        }
        let dir = self.profile_dir(profile);
        if dir.is_dir() { Ok(dir) } else { Err(not_found()) }
    }

    /// Directory of an existing package.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::NotFound`] if the profile or package is missing.
    pub fn existing_package(&self, profile: &str, package: &str) -> Result<PathBuf> {
        let dir = self.existing_profile(profile)?;
        let not_found = || DotmanError::NotFound {
            kind: "package",
            name: format!("{profile}/{package}"),
        };
        if paths::validate_name("package", package).is_err() || package.starts_with('.') {
            return Err(not_found());
        }
        let pkg = dir.join(package);
        if pkg.is_dir() { Ok(pkg) } else { Err(not_found()) }
    }
}

fn read_dir(dir: &Path) -> Result<Vec<std::fs::DirEntry>> {
    std::fs::read_dir(dir)
        .and_then(|entries| entries.collect::<std::io::Result<Vec<_>>>())
        .map_err(|e| DotmanError::io(format!("read {}", dir.display()), e))
}

fn sub_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = read_dir(dir)?
        .into_iter()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}
