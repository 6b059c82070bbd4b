//! Persisted project state records
//!
//! After a successful fetch (next to the sources) and a successful build
//! (inside the build tree) a JSON snapshot of the project is written, so
//! other tooling can see what was fetched and how it was built without
//! re-running anything.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::flags::FlagMap;
use crate::core::project::{LifecycleState, Project, SourceKind};
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// State record errors
#[derive(Error, Debug)]
pub enum RecordError {
    /// Reading or writing the file failed
    #[error(transparent)]
    Io(#[from] FilesystemError),

    /// The file is not a valid record
    #[error("Invalid state record '{}': {error}", path.display())]
    Invalid { path: PathBuf, error: String },
}

/// Serializable snapshot of a project
///
/// Dependencies are recorded by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project name
    pub name: String,
    /// Source kind
    pub source_kind: SourceKind,
    /// Repository URL or local path
    pub address: String,
    /// Revision (remote repositories only)
    #[serde(default)]
    pub revision: Option<String>,
    /// Declared source sub-path
    #[serde(default)]
    pub src_path: Option<String>,
    /// Root directory
    pub root_dir: PathBuf,
    /// Whether the project needs a build
    pub build_required: bool,
    /// Build flags at the time of the snapshot
    #[serde(default)]
    pub build_flags: FlagMap,
    /// Environment flags at the time of the snapshot
    #[serde(default)]
    pub env_flags: FlagMap,
    /// Names of declared dependencies
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Checked-out commit
    #[serde(default)]
    pub resolved_commit: Option<String>,
    /// Effective source path
    #[serde(default)]
    pub resolved_source_path: Option<PathBuf>,
    /// Build tree
    #[serde(default)]
    pub resolved_build_path: Option<PathBuf>,
    /// Lifecycle state
    pub lifecycle_state: LifecycleState,
}

impl ProjectRecord {
    /// Snapshot a project
    pub fn of(project: &Project) -> Self {
        Self {
            name: project.name().to_string(),
            source_kind: project.source().kind(),
            address: project.source().address(),
            revision: project.source().revision().map(str::to_string),
            src_path: project.src_path().map(str::to_string),
            root_dir: project.root_dir().to_path_buf(),
            build_required: project.build_required(),
            build_flags: project.build_flags().clone(),
            env_flags: project.env_flags().clone(),
            dependencies: project
                .dependencies()
                .iter()
                .map(|d| d.name.clone())
                .collect(),
            resolved_commit: project.resolved_commit().map(|c| c.to_string()),
            resolved_source_path: project.resolved_source_path().map(Path::to_path_buf),
            resolved_build_path: project.resolved_build_path().map(Path::to_path_buf),
            lifecycle_state: project.state(),
        }
    }

    /// Where the fetch record of `name` lives inside its source directory
    pub fn fetch_path(source_dir: &Path, name: &str) -> PathBuf {
        source_dir.join(format!("{name}.fetch.json"))
    }

    /// Where the build record of `name` lives inside its build directory
    pub fn build_path(build_dir: &Path, name: &str) -> PathBuf {
        build_dir.join(format!("{name}.build.json"))
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the record
    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        let json = self.to_json().map_err(|e| RecordError::Invalid {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        filesystem::write_file(path, &json)?;
        Ok(())
    }

    /// Read a record
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let content = filesystem::read_file(path)?;
        serde_json::from_str(&content).map_err(|e| RecordError::Invalid {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Read a record if the file exists and parses
    pub fn load_if_present(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }
        match Self::load(path) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring unreadable state record: {e}");
                None
            }
        }
    }

    /// Whether this record describes the same source as `project`
    pub fn matches_source(&self, project: &Project) -> bool {
        self.name == project.name()
            && self.source_kind == project.source().kind()
            && self.address == project.source().address()
            && self.revision.as_deref() == project.source().revision()
            && self.src_path.as_deref() == project.src_path()
    }
}
