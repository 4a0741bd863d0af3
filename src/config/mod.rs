//! Runtime settings: repository root, home directory, external programs and
//! timeouts.
//!
//! Precedence is CLI flags, then environment (`DOTMAN_ROOT`, `HOME`), then
//! `<root>/dotman.toml`, then built-in defaults.
pub mod toml_loader;

use anyhow::{Context as _, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional settings file at the repository root.
pub const CONFIG_FILE: &str = "dotman.toml";

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default commit message used by sync.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Auto-sync: Automated commit by Dotman";

/// Contents of `dotman.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Per-command timeout in seconds; `0` disables the timeout.
    pub timeout_secs: Option<u64>,
    /// Program used for version control.
    pub git: Option<String>,
    /// Program used for linking.
    pub stow: Option<String>,
    /// Extra top-level directory names that are never profiles.
    pub exclude: Vec<String>,
    /// Commit message for sync auto-commits.
    pub commit_message: Option<String>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--root`.
    pub root: Option<PathBuf>,
    /// `--home`.
    pub home: Option<PathBuf>,
    /// `--timeout`.
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Repository root.
    pub root: PathBuf,
    /// Home directory packages are linked into.
    pub home: PathBuf,
    /// Per-command timeout; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Version control program.
    pub git: String,
    /// Link program.
    pub stow: String,
    /// Extra profile exclusions.
    pub exclude: Vec<String>,
    /// Auto-commit message.
    pub commit_message: String,
}

impl Settings {
    /// Settings with built-in defaults for an explicit root and home.
    #[must_use]
    pub fn new(root: PathBuf, home: PathBuf) -> Self {
        Self {
            root,
            home,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            git: "git".to_string(),
            stow: "stow".to_string(),
            exclude: Vec::new(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }

    /// Resolve settings from CLI overrides, the environment, and `dotman.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or home directory cannot be determined or
    /// the settings file is invalid.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let cwd = std::env::current_dir().context("reading current directory")?;
        let env_root = std::env::var_os("DOTMAN_ROOT").map(PathBuf::from);
        let root = resolve_root(overrides.root.as_deref(), env_root.as_deref(), &cwd)?;

        let home = match &overrides.home {
            Some(home) => home.clone(),
            None => std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
                .context("cannot determine home directory; set HOME or pass --home")?,
        };
        let home = dunce::canonicalize(&home)
            .with_context(|| format!("home directory {} is not accessible", home.display()))?;

        let file: FileConfig = toml_loader::load_config(&root.join(CONFIG_FILE))?;
        Ok(Self::new(root, home).with_file_config(file, overrides.timeout_secs))
    }

    /// Apply `dotman.toml` values and a CLI timeout override.
    #[must_use]
    pub fn with_file_config(mut self, file: FileConfig, timeout_override: Option<u64>) -> Self {
        if let Some(secs) = timeout_override.or(file.timeout_secs) {
            self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(git) = file.git {
            self.git = git;
        }
        if let Some(stow) = file.stow {
            self.stow = stow;
        }
        if let Some(msg) = file.commit_message {
            self.commit_message = msg;
        }
        self.exclude = file.exclude;
        self
    }

    /// Path of the append-only log file.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.root.join("dotman.log")
    }
}

/// Determine the repository root.
///
/// Uses the explicit `--root` value, then `DOTMAN_ROOT`, then walks up from
/// `cwd` to the first directory containing `.git`.
///
/// # Errors
///
/// Returns an error if no candidate is found or the chosen directory does not
/// exist.
pub fn resolve_root(explicit: Option<&Path>, env_root: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(root) = explicit.or(env_root) {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            cwd.join(root)
        };
        return dunce::canonicalize(&root)
            .with_context(|| format!("repository root {} does not exist", root.display()));
    }

    let mut dir = Some(cwd);
    while let Some(candidate) = dir {
        if candidate.join(".git").exists() {
            return Ok(candidate.to_path_buf());
        }
        dir = candidate.parent();
    }

    bail!("cannot determine dotman root: not in a git repository. Use --root or set DOTMAN_ROOT")
}
