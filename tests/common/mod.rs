//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use projbuild::core::settings::{CommandSpec, Settings};
use projbuild::infra::git::{CommitId, RepoHandle, VcsError, VersionControl};
use tempfile::TempDir;

/// Configure step: records its arguments, fails when `-DFAIL=1` is passed
pub const CONFIGURE_SCRIPT: &str = r#"
echo "configuring with $*"
printf '%s\n' "$@" > configure.args
case "$*" in
  *-DFAIL=1*) echo "configure exploded" >&2; exit 1 ;;
esac
"#;

/// Compile step: produces a `lib` directory
pub const COMPILE_SCRIPT: &str = r#"
test -f configure.args || { echo "not configured" >&2; exit 2; }
mkdir -p lib
echo built > lib/built.txt
echo "compiled with $*"
"#;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Root directory handed to projects
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("testing")
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a local source tree with a single header and return its path
    pub fn create_source(&self, name: &str) -> PathBuf {
        self.create_file(&format!("{name}/include/{name}.h"), "#pragma once\n");
        self.dir.path().join(name)
    }

    /// Settings that run `sh` for configure and compile
    pub fn settings(&self) -> Settings {
        sh_settings(&self.root())
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings rooted at `root` that use the shell scripts above
pub fn sh_settings(root: &Path) -> Settings {
    Settings::default()
        .with_root_dir(root)
        .with_configure(CommandSpec::new("sh").with_args(["-c", CONFIGURE_SCRIPT, "configure"]))
        .with_compile(CommandSpec::new("sh").with_args(["-c", COMPILE_SCRIPT, "compile"]))
        .with_jobs(2)
}

#[derive(Debug, Default)]
pub struct FakeVcsState {
    /// Addresses cloned, in order
    pub clones: Vec<String>,
    /// Revisions checked out, in order
    pub checkouts: Vec<String>,
    /// Addresses whose clone fails after leaving a partial file behind
    pub failing: HashSet<String>,
}

/// In-memory version control: a clone writes a `CMakeLists.txt`
///
/// Clones share state, so a test can keep one handle and give the other to
/// an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FakeVcs {
    pub state: Rc<RefCell<FakeVcsState>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clone_count(&self) -> usize {
        self.state.borrow().clones.len()
    }

    pub fn clones_of(&self, address: &str) -> usize {
        self.state
            .borrow()
            .clones
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }

    pub fn fail_clone(&self, address: &str) {
        self.state.borrow_mut().failing.insert(address.to_string());
    }

    pub fn heal(&self, address: &str) {
        self.state.borrow_mut().failing.remove(address);
    }

    /// Commit id the fake reports for a revision
    pub fn commit_for(revision: &str) -> String {
        let mut id = hex::encode(revision);
        id.truncate(40);
        format!("{id:0<40}")
    }
}

impl VersionControl for FakeVcs {
    fn clone_repo(&self, address: &str, dest: &Path) -> Result<RepoHandle, VcsError> {
        std::fs::write(dest.join("CMakeLists.txt"), format!("# {address}\n"))
            .expect("Failed to write fake checkout");
        if self.state.borrow().failing.contains(address) {
            return Err(VcsError::CloneFailed {
                url: address.to_string(),
                error: "connection reset".to_string(),
            });
        }
        self.state.borrow_mut().clones.push(address.to_string());
        Ok(RepoHandle {
            path: dest.to_path_buf(),
            address: address.to_string(),
        })
    }

    fn checkout(
        &self,
        repo: &RepoHandle,
        revision: &str,
        _recurse_submodules: bool,
    ) -> Result<(), VcsError> {
        std::fs::write(repo.path.join(".revision"), revision).expect("Failed to record revision");
        self.state.borrow_mut().checkouts.push(revision.to_string());
        Ok(())
    }

    fn resolved_commit(&self, path: &Path) -> Result<CommitId, VcsError> {
        let revision =
            std::fs::read_to_string(path.join(".revision")).map_err(|e| VcsError::ResolveFailed {
                repo: path.to_path_buf(),
                error: e.to_string(),
            })?;
        Ok(CommitId::new(Self::commit_for(&revision)))
    }
}

/// Run the projbuild binary with a manifest in `dir`
pub fn run_projbuild(dir: &Path, args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_projbuild"))
        .current_dir(dir)
        .env_remove("PROJBUILD_MANIFEST")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute projbuild")
}
