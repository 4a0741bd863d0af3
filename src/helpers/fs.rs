//! File-system helpers shared by the link engine, backup vault and storage.
//!
//! Moves prefer `rename`; when the source and destination are on different
//! filesystems the data is copied, the copy is verified against the source
//! with SHA-256, and only then is the source removed.
use anyhow::{Context as _, Result, bail};
use sha2::{Digest as _, Sha256};
use std::io;
use std::path::Path;

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Whether anything (including a broken symlink) exists at `path`.
#[must_use]
pub fn exists_no_follow(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Whether `path` is a real directory (not a symlink to one).
#[must_use]
pub fn is_real_dir(path: &Path) -> bool {
    path.symlink_metadata().is_ok_and(|m| m.is_dir())
}

/// Copy a file, directory tree, or symlink from `src` to `dst`.
///
/// Symlinks are recreated as symlinks with the same target rather than
/// followed. Parent directories of `dst` are created as needed.
///
/// # Errors
///
/// Returns an error if any entry cannot be read, created, or copied.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    let meta = src
        .symlink_metadata()
        .with_context(|| format!("reading metadata: {}", src.display()))?;
    ensure_parent_dir(dst)?;
    if meta.is_symlink() {
        copy_symlink(src, dst)
    } else if meta.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        std::fs::copy(src, dst)
            .map(|_| ())
            .with_context(|| format!("copying {} to {}", src.display(), dst.display()))
    }
}

/// Recursively copy a directory tree, preserving symlinks.
///
/// # Errors
///
/// Returns an error if the destination directory cannot be created, a source
/// entry cannot be read, or a file cannot be copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)
        .with_context(|| format!("creating directory {}", dst.display()))?;
    for entry in
        std::fs::read_dir(src).with_context(|| format!("reading directory {}", src.display()))?
    {
        let entry = entry.with_context(|| format!("reading entry in {}", src.display()))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading file type: {}", src_path.display()))?;
        if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path).with_context(|| {
                format!("copying {} to {}", src_path.display(), dst_path.display())
            })?;
        }
    }
    Ok(())
}

fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target =
        std::fs::read_link(src).with_context(|| format!("reading link: {}", src.display()))?;
    create_symlink(&target, dst)
}

/// Create a symlink at `link` pointing to `target`.
///
/// # Errors
///
/// Returns an error if the link cannot be created.
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }

    #[cfg(windows)]
    {
        let result = if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        result.with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }

    Ok(())
}

/// Remove whatever is at `path`: a directory tree, a file, or a symlink
/// (without following it).
///
/// # Errors
///
/// Returns an error if the path cannot be removed.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("removing directory {}", path.display()))
    } else {
        std::fs::remove_file(path).with_context(|| format!("removing {}", path.display()))
    }
}

/// Move `src` to `dst`, creating `dst`'s parent directories.
///
/// Tries `rename` first. On a cross-filesystem error the data is copied,
/// verified with [`tree_digest`], and the source is removed only when the
/// digests match.
///
/// # Errors
///
/// Returns an error if the move fails; the source is left intact unless the
/// verified copy succeeded.
pub fn move_path(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_path(src, dst)?;
            let expected = tree_digest(src)?;
            let actual = tree_digest(dst)?;
            if expected != actual {
                bail!(
                    "copy of {} to {} does not match the source; source left in place",
                    src.display(),
                    dst.display()
                );
            }
            remove_path(src)
        }
        Err(e) => Err(e).with_context(|| format!("moving {} to {}", src.display(), dst.display())),
    }
}

/// SHA-256 digest over a file, symlink, or directory tree.
///
/// Directory entries are visited in name order and each contributes its
/// relative path plus its content (or link target), so two trees hash equal
/// exactly when they have the same shape and bytes.
///
/// # Errors
///
/// Returns an error if any entry cannot be read.
pub fn tree_digest(path: &Path) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    hash_entry(path, Path::new(""), &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

fn hash_entry(path: &Path, rel: &Path, hasher: &mut Sha256) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    hasher.update(rel.to_string_lossy().as_bytes());
    if meta.is_symlink() {
        hasher.update(b"L");
        let target =
            std::fs::read_link(path).with_context(|| format!("reading link: {}", path.display()))?;
        hasher.update(target.to_string_lossy().as_bytes());
    } else if meta.is_dir() {
        hasher.update(b"D");
        let mut names: Vec<_> = std::fs::read_dir(path)
            .with_context(|| format!("reading directory {}", path.display()))?
            .filter_map(|e| e.ok().map(|e| e.file_name()))
            .collect();
        names.sort();
        for name in names {
            hash_entry(&path.join(&name), &rel.join(&name), hasher)?;
        }
    } else {
        hasher.update(b"F");
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        hasher.update(&bytes);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn copies_files_and_subdirectories() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        std::fs::write(src.path().join("a.txt"), b"aaa").unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/b.txt"), b"bbb").unwrap();

        let target = dst.path().join("out");
        copy_dir_recursive(src.path(), &target).unwrap();

        assert_eq!(std::fs::read(target.join("a.txt")).unwrap(), b"aaa");
        assert_eq!(std::fs::read(target.join("sub/b.txt")).unwrap(), b"bbb");
    }

    #[cfg(unix)]
    #[test]
    fn copy_preserves_symlinks() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", src.path().join("link")).unwrap();

        let target = dst.path().join("out");
        copy_dir_recursive(src.path(), &target).unwrap();

        let link = std::fs::read_link(target.join("link")).unwrap();
        assert_eq!(link, Path::new("/nonexistent/target"));
    }

    #[test]
    fn copy_path_creates_parents_for_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("file.txt");
        std::fs::write(&src, b"x").unwrap();
        let dst = dir.path().join("a/b/file.txt");
        copy_path(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"x");
        assert!(src.exists(), "copy must not remove the source");
    }

    #[test]
    fn ensure_parent_dir_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("file.txt");
        ensure_parent_dir(&nested).unwrap();
        assert!(dir.path().join("a").join("b").exists());
    }

    #[test]
    fn move_path_moves_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/file"), b"data").unwrap();
        let dst = dir.path().join("deep/dst");

        move_path(&src, &dst).unwrap();

        assert!(!exists_no_follow(&src));
        assert_eq!(std::fs::read(dst.join("nested/file")).unwrap(), b"data");
    }

    #[test]
    fn remove_path_handles_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let sub = dir.path().join("d");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir_all(sub.join("inner")).unwrap();
        remove_path(&file).unwrap();
        remove_path(&sub).unwrap();
        assert!(!file.exists());
        assert!(!sub.exists());
    }

    #[cfg(unix)]
    #[test]
    fn remove_path_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::fs::write(real.join("keep"), b"k").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        remove_path(&link).unwrap();

        assert!(!exists_no_follow(&link));
        assert!(real.join("keep").exists());
    }

    #[test]
    fn tree_digest_detects_content_changes() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for dir in [a.path(), b.path()] {
            std::fs::create_dir(dir.join("sub")).unwrap();
            std::fs::write(dir.join("sub/f"), b"same").unwrap();
        }
        assert_eq!(tree_digest(a.path()).unwrap(), tree_digest(b.path()).unwrap());

        std::fs::write(b.path().join("sub/f"), b"different").unwrap();
        assert_ne!(tree_digest(a.path()).unwrap(), tree_digest(b.path()).unwrap());
    }

    #[test]
    fn is_real_dir_distinguishes_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(is_real_dir(dir.path()));
        assert!(!is_real_dir(&file));
    }
}
