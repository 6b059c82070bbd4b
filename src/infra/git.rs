//! Git operations
//!
//! The orchestrator only needs three things from version control: clone a
//! repository, check out a revision (with submodules), and report which commit
//! a checkout sits on. [`VersionControl`] is that narrow seam; [`GitClient`]
//! is the real implementation, tests plug in fakes.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::infra::process::{self, Invocation};

/// Version control errors
#[derive(Error, Debug)]
pub enum VcsError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// Failed to checkout revision
    #[error("Failed to checkout '{revision}' in '{}': {error}", repo.display())]
    CheckoutFailed {
        repo: PathBuf,
        revision: String,
        error: String,
    },

    /// Failed to update submodules
    #[error("Failed to update submodules in '{}': {error}", repo.display())]
    SubmoduleFailed { repo: PathBuf, error: String },

    /// Failed to resolve HEAD to a commit
    #[error("Failed to resolve HEAD of '{}': {error}", repo.display())]
    ResolveFailed { repo: PathBuf, error: String },

    /// Invalid repository
    #[error("Invalid repository at '{}': {error}", path.display())]
    InvalidRepository { path: PathBuf, error: String },

    /// The git executable is required but missing
    #[error("git executable not found in PATH")]
    GitNotFound,
}

/// Full hex id of a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    /// Wrap a commit id, normalising hex to lowercase
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// Get the id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local clone produced by [`VersionControl::clone_repo`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    /// Where the working tree lives
    pub path: PathBuf,
    /// Address it was cloned from
    pub address: String,
}

/// The version-control capability used by project fetches
pub trait VersionControl {
    /// Clone `address` into `dest` (which must be empty or absent)
    fn clone_repo(&self, address: &str, dest: &Path) -> Result<RepoHandle, VcsError>;

    /// Check out a branch or commit, optionally initialising submodules recursively
    fn checkout(
        &self,
        repo: &RepoHandle,
        revision: &str,
        recurse_submodules: bool,
    ) -> Result<(), VcsError>;

    /// Commit currently checked out at `path`
    fn resolved_commit(&self, path: &Path) -> Result<CommitId, VcsError>;
}

/// Git client: gix for clone and HEAD inspection, the git binary for checkout
///
/// gix cannot update submodules, so checkout shells out to `git`.
#[derive(Debug, Default)]
pub struct GitClient;

impl GitClient {
    /// Create a new git client
    pub fn new() -> Self {
        Self
    }

    fn git(repo: &Path, args: &[&str]) -> Result<process::CapturedOutput, String> {
        let git = which::which("git").map_err(|_| VcsError::GitNotFound.to_string())?;
        let invocation =
            Invocation::new(git.display().to_string(), repo).with_args(args.iter().copied());
        let output = process::run(&invocation).map_err(|e| e.to_string())?;
        if output.success() {
            Ok(output)
        } else {
            Err(format!("{output}: {}", output.stderr.trim()))
        }
    }
}

impl VersionControl for GitClient {
    fn clone_repo(&self, address: &str, dest: &Path) -> Result<RepoHandle, VcsError> {
        let clone_failed = |error: String| VcsError::CloneFailed {
            url: address.to_string(),
            error,
        };

        // Full clone: the requested revision may be any commit.
        let mut prepare =
            gix::prepare_clone(address, dest).map_err(|e| clone_failed(e.to_string()))?;

        let (mut checkout, _outcome) = prepare
            .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_failed(e.to_string()))?;

        checkout
            .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_failed(e.to_string()))?;

        tracing::info!("Cloned {address} into {}", dest.display());

        Ok(RepoHandle {
            path: dest.to_path_buf(),
            address: address.to_string(),
        })
    }

    fn checkout(
        &self,
        repo: &RepoHandle,
        revision: &str,
        recurse_submodules: bool,
    ) -> Result<(), VcsError> {
        tracing::info!("Checking out {} to {revision}", repo.address);

        let mut args = vec!["checkout", revision];
        if recurse_submodules {
            args.push("--recurse-submodules");
        }
        Self::git(&repo.path, &args).map_err(|error| VcsError::CheckoutFailed {
            repo: repo.path.clone(),
            revision: revision.to_string(),
            error,
        })?;

        if recurse_submodules {
            Self::git(&repo.path, &["submodule", "update", "--init", "--recursive"]).map_err(
                |error| VcsError::SubmoduleFailed {
                    repo: repo.path.clone(),
                    error,
                },
            )?;
        }
        Ok(())
    }

    fn resolved_commit(&self, path: &Path) -> Result<CommitId, VcsError> {
        let repo = gix::open(path).map_err(|e| VcsError::InvalidRepository {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let head = repo.head_id().map_err(|e| VcsError::ResolveFailed {
            repo: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(CommitId::new(head.detach().to_string()))
    }
}
