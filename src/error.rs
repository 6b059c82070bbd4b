//! Error types for projbuild
//!
//! Domain-specific error types using thiserror. Every variant that can be
//! raised while working on a project names that project, so messages are
//! attributable without extra context.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::project::{LifecycleState, Stage};
use crate::infra::git::VcsError;
use crate::infra::process::CapturedOutput;

/// Configuration errors
///
/// Always fatal: the caller has to fix the manifest or the project
/// definition, retrying cannot help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Source kind is not one of `git` / `dir`
    #[error("Project '{project}' has unsupported source type '{kind}' (expected 'git' or 'dir')")]
    UnsupportedSourceKind { project: String, kind: String },

    /// Build system is not supported
    #[error("Unsupported build system '{system}' (only 'cmake' is supported)")]
    UnsupportedBuildSystem { system: String },

    /// Propagation target path has an invalid shape
    #[error("Project '{project}' declares invalid propagation path '{path}'")]
    InvalidPropagationPath { project: String, path: String },

    /// Dependency cycle
    #[error("Cyclic dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Two projects share a name
    #[error("Project '{name}' is declared more than once")]
    DuplicateProject { name: String },

    /// Required field missing
    #[error("Project '{project}' is missing required field '{field}'")]
    MissingField { project: String, field: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to read directory entries
    #[error("Failed to read directory '{path}': {error}")]
    ReadDir { path: PathBuf, error: String },
}

/// Fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Version control operation failed
    #[error("Fetch of '{project}' failed: {source}")]
    Vcs {
        project: String,
        #[source]
        source: VcsError,
    },

    /// Local directory source does not exist
    #[error("Fetch of '{project}' failed: source directory '{path}' does not exist")]
    SourceNotFound { project: String, path: PathBuf },

    /// Copying a local directory failed for one or more entries
    #[error("Fetch of '{project}' failed: {} entries could not be copied ({})", failures.len(), failures.join("; "))]
    Copy {
        project: String,
        failures: Vec<String>,
    },

    /// Source directory holds something we did not put there
    #[error("Fetch of '{project}' failed: '{path}' is not empty; fetch with clean to replace it")]
    SourceDirNotEmpty { project: String, path: PathBuf },

    /// Directory preparation failed
    #[error("Fetch of '{project}' failed: {source}")]
    Filesystem {
        project: String,
        #[source]
        source: FilesystemError,
    },

    /// Writing the fetch record failed
    #[error("Fetch of '{project}' failed to write its state record: {error}")]
    Record { project: String, error: String },
}

/// Build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Build requested before a successful fetch
    #[error("Cannot build '{project}': it has not been fetched")]
    NotFetched { project: String },

    /// Configure step exited unsuccessfully
    #[error("Configure step failed for '{project}' ({output}); see {}", log.display())]
    ConfigureFailed {
        project: String,
        output: CapturedOutput,
        log: PathBuf,
    },

    /// Compile step exited unsuccessfully
    #[error("Compile step failed for '{project}' ({output}); see {}", log.display())]
    CompileFailed {
        project: String,
        output: CapturedOutput,
        log: PathBuf,
    },

    /// External command exceeded the build timeout
    #[error("{stage} step for '{project}' timed out after {}s", timeout.as_secs())]
    TimedOut {
        project: String,
        stage: Stage,
        timeout: Duration,
        output: CapturedOutput,
    },

    /// External command could not be started
    #[error("{stage} step for '{project}' could not start '{program}': {error}")]
    Launch {
        project: String,
        stage: Stage,
        program: String,
        error: String,
    },

    /// Build directory or log handling failed
    #[error("Build of '{project}' failed: {source}")]
    Filesystem {
        project: String,
        #[source]
        source: FilesystemError,
    },

    /// Writing the build record failed
    #[error("Build of '{project}' failed to write its state record: {error}")]
    Record { project: String, error: String },
}

impl BuildError {
    /// Captured process output, when the failure came from a process
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            Self::ConfigureFailed { output, .. }
            | Self::CompileFailed { output, .. }
            | Self::TimedOut { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Dependency resolution errors
///
/// Any of these aborts the remaining dependency chain.
#[derive(Error, Debug)]
pub enum DependencyError {
    /// Dependency is not declared anywhere
    #[error("Dependency '{0}' is not defined")]
    Unresolved(String),

    /// Dependency could not be fetched
    #[error("Dependency '{name}' failed to fetch: {source}")]
    FetchFailed {
        name: String,
        #[source]
        source: Box<FetchError>,
    },

    /// Dependency could not be built
    #[error("Dependency '{name}' failed to build: {source}")]
    BuildFailed {
        name: String,
        #[source]
        source: Box<BuildError>,
    },

    /// Dependency has not reached the state its value requires
    #[error("Cannot propagate from '{name}': it is {actual}, expected {required}")]
    NotReady {
        name: String,
        required: LifecycleState,
        actual: LifecycleState,
    },

    /// Configuration problem found while resolving
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Top-level projbuild error type
#[derive(Error, Debug)]
pub enum ProjbuildError {
    /// Manifest not found
    #[error("Manifest not found at '{path}'")]
    ManifestNotFound { path: PathBuf },

    /// Manifest parse error
    #[error("Failed to parse manifest: {source}")]
    ManifestParse { source: toml::de::Error },

    /// Manifest could not be preprocessed
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// No project with this name
    #[error("Project '{name}' is not declared in the manifest")]
    UnknownProject { name: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Dependency error
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
