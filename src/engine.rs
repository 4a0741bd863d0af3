//! The serialized entry point used by front-ends.
//!
//! [`Engine`] owns the resolved settings, the process executor and the
//! cancellation token. Every public operation takes the engine's lock for its
//! whole duration, so at most one action runs at a time, and returns an
//! [`Outcome`] carrying the transcript alongside the result.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::Settings;
use crate::conflicts::ConflictPatterns;
use crate::error::{DotmanError, Result};
use crate::exec::{CancelToken, Executor};
use crate::git::{Git, RepoStatus};
use crate::helpers::paths;
use crate::layout::Layout;
use crate::link::{DeleteMode, ImportReport, LinkEngine, PackageLink, RestoreReport};
use crate::storage::{StorageDelete, StorageEntry, StorageManager};
use crate::stow::Stow;
use crate::sync::{SyncEngine, SyncReport};
use crate::transcript::{Outcome, Transcript, TranscriptSink};

/// Mutex-guarded handle through which every command runs.
pub struct Engine {
    settings: Settings,
    layout: Layout,
    executor: Arc<dyn Executor>,
    cancel: CancelToken,
    patterns: ConflictPatterns,
    sink: Option<TranscriptSink>,
    busy: Mutex<()>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("executor", &self.executor)
            .field("cancel", &self.cancel)
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine.
    #[must_use]
    pub fn new(settings: Settings, executor: Arc<dyn Executor>, cancel: CancelToken) -> Self {
        let layout = Layout::new(&settings.root, &settings.exclude);
        Self {
            settings,
            layout,
            executor,
            cancel,
            patterns: ConflictPatterns::default(),
            sink: None,
            busy: Mutex::new(()),
        }
    }

    /// Forward every transcript line to `sink` as it is produced.
    #[must_use]
    pub fn with_sink(mut self, sink: TranscriptSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the conflict pattern table.
    #[must_use]
    pub fn with_patterns(mut self, patterns: ConflictPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Token that cancels the running operation.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn run<T>(&self, action: impl FnOnce(&mut Transcript) -> Result<T>) -> Outcome<T> {
        let _guard = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        self.cancel.reset();
        let mut transcript = Transcript::with_sink(self.sink.clone());
        let result = action(&mut transcript);
        Outcome::new(result, transcript)
    }

    fn require(&self, program: &str) -> Result<()> {
        if self.executor.which(program) {
            Ok(())
        } else {
            Err(DotmanError::MissingTool(program.to_string()))
        }
    }

    fn link_engine(&self) -> LinkEngine<'_> {
        LinkEngine::new(
            &self.layout,
            &self.settings.home,
            Stow::new(self.executor.as_ref(), &self.settings.stow),
            &self.patterns,
            &self.cancel,
        )
    }

    fn git(&self) -> Git<'_> {
        Git::new(self.executor.as_ref(), &self.settings.root, &self.settings.git)
    }

    fn storage(&self) -> StorageManager<'_> {
        StorageManager::new(&self.layout, &self.settings.home)
    }

    /// Profile names, sorted.
    pub fn list_profiles(&self) -> Outcome<Vec<String>> {
        self.run(|_| self.layout.list_profiles())
    }

    /// Create a profile seeded with `.config` and `.local/bin`.
    pub fn create_profile(&self, name: &str) -> Outcome<PathBuf> {
        self.run(|t| {
            let dir = self.layout.create_profile(name)?;
            t.push(format!("Created profile '{name}' at {}", dir.display()));
            Ok(dir)
        })
    }

    /// Link every package of a profile and make it current.
    pub fn apply_profile(&self, name: &str) -> Outcome<Vec<PackageLink>> {
        self.run(|t| {
            self.require(&self.settings.stow)?;
            self.link_engine().apply_profile(name, t)
        })
    }

    /// Delete a profile with the given policy.
    pub fn delete_profile(&self, name: &str, mode: DeleteMode) -> Outcome<Vec<RestoreReport>> {
        self.run(|t| {
            if mode == DeleteMode::Restore {
                self.require(&self.settings.stow)?;
            }
            self.link_engine().delete_profile(name, mode, t)
        })
    }

    /// Name of the last applied profile.
    pub fn current_profile(&self) -> Outcome<Option<String>> {
        self.run(|_| self.layout.current_profile())
    }

    /// Package names of a profile, sorted.
    pub fn list_packages(&self, profile: &str) -> Outcome<Vec<String>> {
        self.run(|_| self.layout.list_packages(profile))
    }

    /// Move a home path into a new package and link it.
    pub fn import_package(&self, profile: &str, name: &str, source: &str, cwd: &Path) -> Outcome<ImportReport> {
        self.run(|t| {
            self.require(&self.settings.stow)?;
            self.link_engine().import_package(profile, name, source, cwd, t)
        })
    }

    /// Unlink a package and move its files back into the home directory.
    pub fn delete_package(&self, profile: &str, name: &str) -> Outcome<RestoreReport> {
        self.run(|t| {
            self.require(&self.settings.stow)?;
            self.link_engine().delete_package(profile, name, t)
        })
    }

    /// Storage items and their origins.
    pub fn list_storage(&self) -> Outcome<Vec<StorageEntry>> {
        self.run(|_| self.storage().list())
    }

    /// Move a path into storage and link it back.
    pub fn add_storage(&self, name: &str, source: &str, cwd: &Path) -> Outcome<StorageEntry> {
        self.run(|t| self.storage().add(name, source, cwd, t))
    }

    /// Restore or purge a storage item.
    pub fn delete_storage(&self, name: &str, mode: StorageDelete) -> Outcome<Option<PathBuf>> {
        self.run(|t| self.storage().delete(name, mode, t))
    }

    /// Reconcile the repository with its remote.
    pub fn sync(&self) -> Outcome<SyncReport> {
        self.run(|t| {
            self.require(&self.settings.git)?;
            SyncEngine::new(self.git(), &self.cancel, &self.settings.commit_message).run(t)
        })
    }

    /// Repository status, optionally fetching first.
    pub fn status(&self, fetch: bool) -> Outcome<RepoStatus> {
        self.run(|_| {
            self.require(&self.settings.git)?;
            self.git().status(fetch)
        })
    }

    /// Paths with uncommitted changes.
    pub fn uncommitted_files(&self) -> Outcome<Vec<String>> {
        self.run(|_| {
            self.require(&self.settings.git)?;
            self.git().uncommitted_files()
        })
    }

    /// Discard local changes to one repository path.
    pub fn reset_file(&self, file: &str) -> Outcome<()> {
        self.run(|t| {
            self.require(&self.settings.git)?;
            paths::ensure_contained(Path::new(file))?;
            self.git().reset_file(file, t)
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::ScriptedExecutor;
    use crate::exec::{ExecError, ExecResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn settings(root: &Path, home: &Path) -> Settings {
        Settings::new(root.to_path_buf(), home.to_path_buf())
    }

    #[test]
    fn missing_stow_is_reported_before_any_change() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(".vimrc"), b"x").unwrap();
        let engine = Engine::new(
            settings(root.path(), home.path()),
            Arc::new(ScriptedExecutor::new().without_program("stow")),
            CancelToken::new(),
        );
        engine.create_profile("laptop").into_result().unwrap();
        let outcome = engine.import_package("laptop", "vim", "~/.vimrc", Path::new("/"));
        assert!(matches!(outcome.result, Err(DotmanError::MissingTool(ref p)) if p == "stow"));
        assert!(home.path().join(".vimrc").exists());
    }

    #[test]
    fn outcome_keeps_transcript_on_failure() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let exec = ScriptedExecutor::new().fail("git fetch origin", "fatal: no remote");
        let engine = Engine::new(settings(root.path(), home.path()), Arc::new(exec), CancelToken::new());
        let outcome = engine.sync();
        assert!(!outcome.is_ok());
        assert_eq!(outcome.transcript[0], "Running: git fetch origin");
        assert!(outcome.transcript.iter().any(|l| l.contains("no remote")));
    }

    #[test]
    fn sink_receives_lines_as_they_are_produced() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let engine = Engine::new(
            settings(root.path(), home.path()),
            Arc::new(ScriptedExecutor::new()),
            CancelToken::new(),
        )
        .with_sink(Arc::new(move |line: &str| {
            sink_seen.lock().unwrap().push(line.to_string());
        }));
        let outcome = engine.create_profile("laptop");
        assert!(outcome.is_ok());
        assert_eq!(*seen.lock().unwrap(), outcome.transcript);
    }

    #[test]
    fn reset_file_rejects_escaping_paths() {
        let root = tempfile::tempdir().unwrap();
        let exec = ScriptedExecutor::new();
        let engine = Engine::new(settings(root.path(), root.path()), Arc::new(exec), CancelToken::new());
        let outcome = engine.reset_file("../elsewhere");
        assert!(matches!(outcome.result, Err(DotmanError::PathValidation(_))));
    }

    #[derive(Debug, Default)]
    struct Overlap {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Executor for Overlap {
        fn run_in(&self, _: &Path, _: &str, _: &[&str]) -> std::result::Result<ExecResult, ExecError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(ExecResult::ok(""))
        }

        fn which(&self, _: &str) -> bool {
            true
        }
    }

    #[test]
    fn operations_are_serialized() {
        let root = tempfile::tempdir().unwrap();
        let exec = Arc::new(Overlap::default());
        let engine = Arc::new(Engine::new(
            settings(root.path(), root.path()),
            Arc::clone(&exec) as Arc<dyn Executor>,
            CancelToken::new(),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let _ = engine.status(false);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(exec.peak.load(Ordering::SeqCst), 1);
    }
}
