//! User-supplied path expansion and home-relative path computation.
use std::path::{Component, Path, PathBuf};

use crate::error::{DotmanError, Result};

/// Expand a user-supplied path.
///
/// A leading `~` or `~/` expands to `home`; any other relative path is
/// resolved against `cwd`. `.` and `..` components are removed lexically.
/// A path that does not exist afterwards is rejected.
///
/// # Errors
///
/// Returns [`DotmanError::PathValidation`] if the resolved path does not exist.
pub fn expand_path(input: &str, home: &Path, cwd: &Path) -> Result<PathBuf> {
    let joined = if input == "~" {
        home.to_path_buf()
    } else if let Some(rest) = input.strip_prefix("~/") {
        home.join(rest)
    } else {
        let path = Path::new(input);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        }
    };
    let resolved = normalize(&joined);
    if resolved.symlink_metadata().is_err() {
        return Err(DotmanError::PathValidation(format!(
            "source path does not exist: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Remove `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Return `path` relative to `home`.
///
/// The path must lie strictly inside `home`; `home` itself is rejected.
/// If the lexical comparison fails, the comparison is retried with the
/// path's parent canonicalized, so symlinked prefixes (e.g. `/var` vs
/// `/private/var`) still match.
///
/// # Errors
///
/// Returns [`DotmanError::PathValidation`] ("source outside HOME") otherwise.
pub fn home_relative(path: &Path, home: &Path) -> Result<PathBuf> {
    let outside = || {
        DotmanError::PathValidation(format!(
            "source outside HOME: {} is not inside {}",
            path.display(),
            home.display()
        ))
    };

    let rel = path.strip_prefix(home).ok().map(Path::to_path_buf).or_else(|| {
        let parent = dunce::canonicalize(path.parent()?).ok()?;
        let canonical = parent.join(path.file_name()?);
        let home = dunce::canonicalize(home).ok()?;
        canonical.strip_prefix(&home).ok().map(Path::to_path_buf)
    });

    match rel {
        Some(rel) if !rel.as_os_str().is_empty() => Ok(rel),
        _ => Err(outside()),
    }
}

/// Resolve `source` through any symlinks and check that neither the path as
/// given nor its resolved location overlaps the repository at `root`.
///
/// Returns the resolved path: the content a copy of `source` should take.
///
/// # Errors
///
/// Returns [`DotmanError::PathValidation`] if `source` cannot be resolved
/// (e.g. a dangling link), or if either form lies inside `root` or contains
/// it.
pub fn resolve_outside_repository(source: &Path, root: &Path) -> Result<PathBuf> {
    let resolved = dunce::canonicalize(source).map_err(|e| {
        DotmanError::PathValidation(format!("cannot resolve {}: {e}", source.display()))
    })?;
    let real_root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let overlaps = |p: &Path| {
        [root, real_root.as_path()]
            .iter()
            .any(|r| p.starts_with(r) || r.starts_with(p))
    };
    if overlaps(source) || overlaps(&resolved) {
        let via = if resolved == source {
            String::new()
        } else {
            format!(" (resolves to {})", resolved.display())
        };
        return Err(DotmanError::PathValidation(format!(
            "source {}{via} overlaps the repository at {}",
            source.display(),
            root.display()
        )));
    }
    Ok(resolved)
}

/// Check that `rel` is a non-empty relative path with no `..`, root, or
/// prefix components, so joining it onto a base cannot escape that base.
///
/// # Errors
///
/// Returns [`DotmanError::PathValidation`] if the path is unsafe.
pub fn ensure_contained(rel: &Path) -> Result<()> {
    let safe = !rel.as_os_str().is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(())
    } else {
        Err(DotmanError::PathValidation(format!(
            "refusing unsafe relative path: {}",
            rel.display()
        )))
    }
}

/// Validate a single directory-entry name (profile, package, storage item).
///
/// # Errors
///
/// Returns [`DotmanError::PathValidation`] for empty names, names containing
/// path separators, or `.`/`..`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if name.is_empty() || !single_normal || name.contains('/') || name.contains('\\') {
        return Err(DotmanError::PathValidation(format!(
            "invalid {kind} name: '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expands_to_home() {
        let home = tempfile::tempdir().unwrap();
        let path = expand_path("~", home.path(), Path::new("/")).unwrap();
        assert_eq!(path, home.path());
    }

    #[test]
    fn tilde_slash_expands_under_home() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".bashrc"), "").unwrap();
        let path = expand_path("~/.bashrc", home.path(), Path::new("/")).unwrap();
        assert_eq!(path, home.path().join(".bashrc"));
    }

    #[test]
    fn relative_path_resolves_against_cwd() {
        let cwd = tempfile::tempdir().unwrap();
        std::fs::create_dir(cwd.path().join("notes")).unwrap();
        let path = expand_path("./notes/../notes", Path::new("/nohome"), cwd.path()).unwrap();
        assert_eq!(path, cwd.path().join("notes"));
    }

    #[test]
    fn nonexistent_path_is_validation_error() {
        let cwd = tempfile::tempdir().unwrap();
        let err = expand_path("missing", Path::new("/nohome"), cwd.path()).unwrap_err();
        assert!(matches!(err, DotmanError::PathValidation(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn tilde_user_form_is_not_expanded() {
        let cwd = tempfile::tempdir().unwrap();
        std::fs::create_dir(cwd.path().join("~other")).unwrap();
        let path = expand_path("~other", Path::new("/nohome"), cwd.path()).unwrap();
        assert_eq!(path, cwd.path().join("~other"));
    }

    #[test]
    fn normalize_removes_dot_components() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn home_relative_inside_home() {
        let rel = home_relative(Path::new("/home/u/.config/nvim"), Path::new("/home/u")).unwrap();
        assert_eq!(rel, PathBuf::from(".config/nvim"));
    }

    #[test]
    fn home_relative_rejects_outside_and_home_itself() {
        let err = home_relative(Path::new("/etc/hosts"), Path::new("/home/u")).unwrap_err();
        assert!(err.to_string().contains("source outside HOME"));
        assert!(home_relative(Path::new("/home/u"), Path::new("/home/u")).is_err());
        assert!(home_relative(Path::new("/home/user2/x"), Path::new("/home/u")).is_err());
    }

    #[test]
    fn ensure_contained_rejects_escapes() {
        assert!(ensure_contained(Path::new(".config/x")).is_ok());
        assert!(ensure_contained(Path::new("../x")).is_err());
        assert!(ensure_contained(Path::new("/etc/passwd")).is_err());
        assert!(ensure_contained(Path::new("")).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn resolve_follows_links_to_content() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let real = home.path().join("real_vimrc");
        std::fs::write(&real, "set nu").unwrap();
        let link = home.path().join(".vimrc");
        std::os::unix::fs::symlink("real_vimrc", &link).unwrap();
        let resolved = resolve_outside_repository(&link, root.path()).unwrap();
        assert_eq!(resolved, dunce::canonicalize(&real).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn resolve_rejects_paths_reaching_into_the_repository() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let pkg = root.path().join("laptop/nvim/.config/nvim");
        std::fs::create_dir_all(pkg.join("lua")).unwrap();
        std::fs::create_dir_all(home.path().join(".config")).unwrap();
        std::os::unix::fs::symlink(&pkg, home.path().join(".config/nvim")).unwrap();

        let through_link = home.path().join(".config/nvim/lua");
        assert!(matches!(
            resolve_outside_repository(&through_link, root.path()),
            Err(DotmanError::PathValidation(_))
        ));
        assert!(resolve_outside_repository(&pkg, root.path()).is_err());
        assert!(resolve_outside_repository(home.path(), home.path()).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn resolve_rejects_dangling_links() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let link = home.path().join(".gone");
        std::os::unix::fs::symlink("missing", &link).unwrap();
        assert!(resolve_outside_repository(&link, root.path()).is_err());
    }

    #[test]
    fn validate_name_rules() {
        assert!(validate_name("profile", "laptop").is_ok());
        assert!(validate_name("profile", "").is_err());
        assert!(validate_name("profile", "a/b").is_err());
        assert!(validate_name("profile", "..").is_err());
        assert!(validate_name("profile", ".").is_err());
    }
}
