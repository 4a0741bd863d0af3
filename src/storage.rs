//! Storage: arbitrary files and directories kept in `<root>/storage` and
//! linked back to where they came from.
//!
//! Each import is recorded in `storage/.dotman_manifest.toml` so the item can
//! later be moved back to its origin:
//!
//! ```toml
//! [items.wallpapers]
//! origin = "/home/me/Pictures/wallpapers"
//! ```
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::toml_loader;
use crate::error::{DotmanError, Result};
use crate::helpers::{fs, paths};
use crate::layout::{Layout, STORAGE_MANIFEST};
use crate::link::discard_partial_copy;
use crate::transcript::Transcript;

/// One manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Absolute path the item was imported from.
    pub origin: PathBuf,
}

/// Contents of the storage manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Records keyed by item name.
    pub items: BTreeMap<String, ManifestEntry>,
}

/// A listed storage item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    /// Name as listed (directories end in `/`).
    pub name: String,
    /// Recorded origin, when the item was imported by dotman.
    pub origin: Option<PathBuf>,
}

/// What `delete` does with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDelete {
    /// Move the item back to its origin, replacing the import link.
    Restore,
    /// Remove the item from the repository.
    Purge,
}

/// Imports, lists and removes storage items.
#[derive(Debug)]
pub struct StorageManager<'a> {
    layout: &'a Layout,
    home: &'a Path,
}

impl<'a> StorageManager<'a> {
    /// Manager for `layout`'s storage directory.
    #[must_use]
    pub const fn new(layout: &'a Layout, home: &'a Path) -> Self {
        Self { layout, home }
    }

    fn manifest_path(&self) -> PathBuf {
        self.layout.storage_dir().join(STORAGE_MANIFEST)
    }

    /// Read the manifest; a missing file is an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::Config`] if the manifest cannot be parsed.
    pub fn manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        toml_loader::load_config(&path).map_err(|e| DotmanError::Config {
            path,
            message: format!("{e:#}"),
        })
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path();
        toml_loader::save_config(&path, manifest).map_err(|e| DotmanError::Config {
            path,
            message: format!("{e:#}"),
        })
    }

    /// Storage items with their recorded origins, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or manifest cannot be read.
    pub fn list(&self) -> Result<Vec<StorageEntry>> {
        let manifest = self.manifest()?;
        Ok(self
            .layout
            .list_storage_items()?
            .into_iter()
            .map(|name| {
                let origin = manifest
                    .items
                    .get(name.trim_end_matches('/'))
                    .map(|e| e.origin.clone());
                StorageEntry { name, origin }
            })
            .collect())
    }

    /// Copy `source` into `storage/<name>`, record its origin, delete the
    /// original, and leave a symlink to the stored copy in its place.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::PathValidation`] before any change if the name
    /// is invalid or taken, or the source is missing or overlaps the
    /// repository. Failures after the original is deleted are
    /// [`DotmanError::PartialMutation`].
    pub fn add(&self, name: &str, source: &str, cwd: &Path, transcript: &mut Transcript) -> Result<StorageEntry> {
        paths::validate_name("storage item", name)?;
        if name == STORAGE_MANIFEST {
            return Err(DotmanError::PathValidation(format!(
                "'{name}' is reserved"
            )));
        }
        let source = paths::expand_path(source, self.home, cwd)?;
        let content = paths::resolve_outside_repository(&source, self.layout.root())?;
        let destination = self.layout.storage_dir().join(name);
        if fs::exists_no_follow(&destination) {
            return Err(DotmanError::PathValidation(format!(
                "storage item '{name}' already exists"
            )));
        }
        let mut manifest = self.manifest()?;

        transcript.push(format!(
            "Copying {} to {}...",
            source.display(),
            destination.display()
        ));
        let recorded = fs::copy_path(&content, &destination)
            .map_err(|e| DotmanError::io(format!("copy {}", source.display()), e))
            .and_then(|()| {
                manifest.items.insert(
                    name.to_string(),
                    ManifestEntry {
                        origin: source.clone(),
                    },
                );
                self.save_manifest(&manifest)
            });
        if let Err(e) = recorded {
            discard_partial_copy(&destination, transcript);
            return Err(e);
        }

        let partial = |detail: String| DotmanError::PartialMutation {
            operation: format!("storage add '{name}'"),
            detail,
        };

        transcript.push(format!("Deleting original {}...", source.display()));
        fs::remove_path(&source).map_err(|e| {
            partial(format!(
                "copied to {} but the original could not be deleted: {e:#}",
                destination.display()
            ))
        })?;

        transcript.push(format!(
            "Linking {} -> {}...",
            source.display(),
            destination.display()
        ));
        fs::create_symlink(&destination, &source).map_err(|e| {
            partial(format!(
                "moved to {} but the link at {} could not be created: {e:#}",
                destination.display(),
                source.display()
            ))
        })?;

        let is_dir = fs::is_real_dir(&destination);
        Ok(StorageEntry {
            name: if is_dir { format!("{name}/") } else { name.to_string() },
            origin: Some(source),
        })
    }

    /// Remove a storage item.
    ///
    /// [`StorageDelete::Restore`] requires that the recorded origin is still
    /// the symlink created at import; the link is replaced by the item.
    /// [`StorageDelete::Purge`] deletes the item, and the import link too if
    /// it is still in place.
    ///
    /// # Errors
    ///
    /// Returns [`DotmanError::NotFound`] for an unknown item, or
    /// [`DotmanError::PathValidation`] when a restore is impossible.
    pub fn delete(&self, name: &str, mode: StorageDelete, transcript: &mut Transcript) -> Result<Option<PathBuf>> {
        let name = name.trim_end_matches('/');
        paths::validate_name("storage item", name)?;
        let path = self.layout.storage_dir().join(name);
        if name == STORAGE_MANIFEST || !fs::exists_no_follow(&path) {
            return Err(DotmanError::NotFound {
                kind: "storage item",
                name: name.to_string(),
            });
        }

        let mut manifest = self.manifest()?;
        let origin = manifest.items.get(name).map(|e| e.origin.clone());
        let linked_origin = origin.filter(|o| links_to(o, &path));

        match mode {
            StorageDelete::Restore => {
                let Some(origin) = linked_origin else {
                    return Err(DotmanError::PathValidation(format!(
                        "storage item '{name}' cannot be restored: its origin is unknown or no longer links to it; use --purge to delete it from the repository"
                    )));
                };
                transcript.push(format!("Removing link {}...", origin.display()));
                std::fs::remove_file(&origin)
                    .map_err(|e| DotmanError::io(format!("remove {}", origin.display()), e))?;
                transcript.push(format!(
                    "Moving {} back to {}...",
                    path.display(),
                    origin.display()
                ));
                fs::move_path(&path, &origin).map_err(|e| DotmanError::PartialMutation {
                    operation: format!("storage delete '{name}'"),
                    detail: format!(
                        "link at {} removed but the item is still at {}: {e:#}",
                        origin.display(),
                        path.display()
                    ),
                })?;
                manifest.items.remove(name);
                self.save_manifest(&manifest)?;
                Ok(Some(origin))
            }
            StorageDelete::Purge => {
                if let Some(link) = &linked_origin {
                    transcript.push(format!("Removing link {}...", link.display()));
                    std::fs::remove_file(link)
                        .map_err(|e| DotmanError::io(format!("remove {}", link.display()), e))?;
                }
                transcript.push(format!("Deleting storage item {name}..."));
                fs::remove_path(&path)
                    .map_err(|e| DotmanError::io(format!("remove {}", path.display()), e))?;
                if manifest.items.remove(name).is_some() {
                    self.save_manifest(&manifest)?;
                }
                Ok(None)
            }
        }
    }
}

/// Whether `link` is a symlink resolving to `target`.
fn links_to(link: &Path, target: &Path) -> bool {
    let Ok(dest) = std::fs::read_link(link) else {
        return false;
    };
    if dest == target {
        return true;
    }
    let dest = if dest.is_absolute() {
        dest
    } else {
        link.parent().map_or(dest.clone(), |p| p.join(&dest))
    };
    matches!(
        (dunce::canonicalize(&dest), dunce::canonicalize(target)),
        (Ok(a), Ok(b)) if a == b
    )
}
