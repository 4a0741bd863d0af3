// Shared helpers for integration tests.
//
// Provides a temporary repository and home directory pair, and an executor
// that emulates stow's linking rules in-process so link tests do not depend
// on stow being installed. Every other program is run for real.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dotman::config::Settings;
use dotman::engine::Engine;
use dotman::exec::{CancelToken, ExecError, ExecResult, Executor, SystemExecutor};

/// An isolated repository root and home directory, each backed by a
/// [`tempfile::TempDir`].
#[derive(Debug)]
pub struct TestEnv {
    root_dir: tempfile::TempDir,
    home_dir: tempfile::TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let root_dir = tempfile::tempdir().expect("create root tempdir");
        let home_dir = tempfile::tempdir().expect("create home tempdir");
        let root = dunce::canonicalize(root_dir.path()).expect("canonicalize root");
        let home = dunce::canonicalize(home_dir.path()).expect("canonicalize home");
        Self {
            root_dir,
            home_dir,
            root,
            home,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.root.clone(), self.home.clone())
    }

    /// Engine wired to [`FakeStow`].
    pub fn engine(&self) -> Engine {
        self.engine_with(Arc::new(FakeStow::default()))
    }

    pub fn engine_with(&self, executor: Arc<dyn Executor>) -> Engine {
        Engine::new(self.settings(), executor, CancelToken::new())
    }

    /// Write `content` at `home/rel`, creating parent directories.
    pub fn write_home(&self, rel: &str, content: &str) -> PathBuf {
        write_file(&self.home.join(rel), content)
    }

    /// Write `content` at `root/profile/package/rel`.
    pub fn write_package(&self, profile: &str, package: &str, rel: &str, content: &str) -> PathBuf {
        write_file(&self.root.join(profile).join(package).join(rel), content)
    }

    pub fn read_home(&self, rel: &str) -> String {
        std::fs::read_to_string(self.home.join(rel)).expect("read home file")
    }

    pub fn is_link(&self, rel: &str) -> bool {
        self.home
            .join(rel)
            .symlink_metadata()
            .is_ok_and(|m| m.file_type().is_symlink())
    }

    /// Backup directories under `root/backups`, sorted.
    pub fn backups(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.root.join("backups")) else {
            return Vec::new();
        };
        let mut dirs: Vec<_> = entries.map(|e| e.expect("read backups").path()).collect();
        dirs.sort();
        dirs
    }
}

pub fn write_file(path: &Path, content: &str) -> PathBuf {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent dirs");
    std::fs::write(path, content).expect("write file");
    path.to_path_buf()
}

/// Executor that handles `stow` itself and runs everything else for real.
///
/// Linking follows stow's rules closely enough for the engine: each entry
/// of the package is linked at the mirrored home path, real directories that
/// already exist are descended into, and any collision aborts the whole
/// package without changing anything, reported with stow's conflict wording.
#[derive(Debug, Default)]
pub struct FakeStow {
    inner: SystemExecutor,
}

impl Executor for FakeStow {
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        if program != "stow" {
            return self.inner.run_in(dir, program, args);
        }
        let value_after = |flag: &str| {
            args.iter()
                .position(|a| *a == flag)
                .and_then(|i| args.get(i + 1))
                .map(PathBuf::from)
        };
        let (Some(stow_dir), Some(target), Some(package)) =
            (value_after("-d"), value_after("-t"), args.last())
        else {
            return Ok(ExecResult::failed("stow: bad arguments"));
        };
        let package_dir = stow_dir.join(package);
        if !package_dir.is_dir() {
            return Ok(ExecResult::failed(&format!(
                "stow: ERROR: The stow directory {} does not contain package {package}",
                stow_dir.display()
            )));
        }

        if args.contains(&"-D") {
            unlink_tree(&package_dir, &target);
            return Ok(ExecResult::ok(&format!("UNLINK: {package}\n")));
        }

        let mut plan = Vec::new();
        let mut conflicts = Vec::new();
        plan_links(&package_dir, &target, Path::new(""), &mut plan, &mut conflicts);
        if !conflicts.is_empty() {
            let mut output = format!("WARNING! stowing {package} would cause conflicts:\n");
            for line in conflicts {
                output.push_str(&format!("  * {line}\n"));
            }
            output.push_str("All operations aborted.\n");
            return Ok(ExecResult::failed(&output));
        }

        let mut output = String::new();
        for (source, link) in plan {
            std::os::unix::fs::symlink(&source, &link).expect("create link");
            output.push_str(&format!("LINK: {} => {}\n", link.display(), source.display()));
        }
        Ok(ExecResult::ok(&output))
    }

    fn which(&self, program: &str) -> bool {
        program == "stow" || which::which(program).is_ok()
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .expect("read package dir")
        .map(|e| e.expect("read entry").path())
        .collect();
    entries.sort();
    entries
}

fn points_to(link: &Path, source: &Path) -> bool {
    match (dunce::canonicalize(link), dunce::canonicalize(source)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn plan_links(
    src_dir: &Path,
    target_dir: &Path,
    rel: &Path,
    plan: &mut Vec<(PathBuf, PathBuf)>,
    conflicts: &mut Vec<String>,
) {
    for source in sorted_entries(src_dir) {
        let name = source.file_name().expect("entry name");
        let target = target_dir.join(name);
        let rel = rel.join(name);
        let Ok(meta) = target.symlink_metadata() else {
            plan.push((source, target));
            continue;
        };
        if meta.file_type().is_symlink() {
            if !points_to(&target, &source) {
                conflicts.push(format!(
                    "existing target is not owned by stow: {}",
                    rel.display()
                ));
            }
        } else if meta.is_dir() && source.is_dir() {
            plan_links(&source, &target, &rel, plan, conflicts);
        } else {
            conflicts.push(format!(
                "existing target is neither a link nor a directory: {}",
                rel.display()
            ));
        }
    }
}

fn unlink_tree(src_dir: &Path, target_dir: &Path) {
    for source in sorted_entries(src_dir) {
        let target = target_dir.join(source.file_name().expect("entry name"));
        let Ok(meta) = target.symlink_metadata() else {
            continue;
        };
        if meta.file_type().is_symlink() {
            if points_to(&target, &source) {
                std::fs::remove_file(&target).expect("remove link");
            }
        } else if meta.is_dir() && source.is_dir() {
            unlink_tree(&source, &target);
        }
    }
}

/// Initialise a git repository at `dir` with one commit, configured so
/// commits work without a global identity.
pub fn git_init(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    write_file(&dir.join("README"), "dotfiles\n");
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}

/// Run git in `dir`, panicking on failure. Returns standard output.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn has_git() -> bool {
    which::which("git").is_ok()
}
