//! Project model and lifecycle
//!
//! A [`Project`] is an external source unit: where its sources come from, how
//! it is built, and which other projects it depends on. It owns its lifecycle
//! state and moves itself through `Unfetched -> Fetched -> Built` via
//! [`Project::fetch`], [`Project::build`] and [`Project::check_dependencies`].
//!
//! On-disk layout:
//! - `{root}/{name}/src` fetched sources, plus `{name}.fetch.json`
//! - `{root}/{name}/build/{commit}` build tree, plus `{name}.build.log` and
//!   `{name}.build.json`

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::core::build_system::BuildSystemKind;
use crate::core::flags::{merge_environment, FlagMap};
use crate::core::propagation::{apply_rules, Dependency, StagedFlags};
use crate::core::record::ProjectRecord;
use crate::core::settings::Settings;
use crate::error::{BuildError, ConfigurationError, DependencyError, FetchError};
use crate::infra::dirs::default_root_dir;
use crate::infra::filesystem;
use crate::infra::git::{CommitId, VersionControl};
use crate::infra::process::{self, CapturedOutput, Invocation, ProcessError};

/// Where a project's sources come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Cloned from a version-control repository
    #[serde(rename = "git")]
    RemoteRepository,
    /// Copied from a directory on this machine
    #[serde(rename = "dir")]
    LocalDirectory,
}

impl SourceKind {
    /// Parse a manifest `type` value
    pub fn parse(project: &str, kind: &str) -> Result<Self, ConfigurationError> {
        match kind {
            "git" => Ok(Self::RemoteRepository),
            "dir" => Ok(Self::LocalDirectory),
            _ => Err(ConfigurationError::UnsupportedSourceKind {
                project: project.to_string(),
                kind: kind.to_string(),
            }),
        }
    }

    /// Manifest spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteRepository => "git",
            Self::LocalDirectory => "dir",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Repository URL plus the branch or commit to check out
    RemoteRepository { address: String, revision: String },
    /// Directory tree copied verbatim
    LocalDirectory { path: PathBuf },
}

impl Source {
    /// Remote repository source
    pub fn remote(address: impl Into<String>, revision: impl Into<String>) -> Self {
        Self::RemoteRepository {
            address: address.into(),
            revision: revision.into(),
        }
    }

    /// Local directory source
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalDirectory { path: path.into() }
    }

    /// Kind of this source
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::RemoteRepository { .. } => SourceKind::RemoteRepository,
            Self::LocalDirectory { .. } => SourceKind::LocalDirectory,
        }
    }

    /// URL or path, as text
    pub fn address(&self) -> String {
        match self {
            Self::RemoteRepository { address, .. } => address.clone(),
            Self::LocalDirectory { path } => path.display().to_string(),
        }
    }

    /// Revision, for remote repositories
    pub fn revision(&self) -> Option<&str> {
        match self {
            Self::RemoteRepository { revision, .. } => Some(revision),
            Self::LocalDirectory { .. } => None,
        }
    }
}

/// Lifecycle state of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing on disk yet
    Unfetched,
    /// Sources are in place
    Fetched,
    /// Build succeeded
    Built,
    /// Last build attempt failed; sources are still in place
    BuildFailed,
}

impl LifecycleState {
    /// Whether sources are available
    pub fn is_fetched(self) -> bool {
        !matches!(self, Self::Unfetched)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unfetched => f.write_str("unfetched"),
            Self::Fetched => f.write_str("fetched"),
            Self::Built => f.write_str("built"),
            Self::BuildFailed => f.write_str("build failed"),
        }
    }
}

/// Stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Configure,
    Compile,
    Propagate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Configure => f.write_str("configure"),
            Self::Compile => f.write_str("compile"),
            Self::Propagate => f.write_str("propagate"),
        }
    }
}

/// Looks up dependencies by name and makes them usable
///
/// `resolve` returns the dependency once it is fetched and, if it needs one,
/// built. The orchestrator is the production implementation.
pub trait DependencyResolver {
    /// Resolve a dependency, fetching and building it as needed
    fn resolve(&mut self, name: &str) -> Result<&Project, DependencyError>;
}

/// A described external source unit
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    source: Source,
    src_path: Option<String>,
    root_dir: PathBuf,
    build_required: bool,
    build_flags: FlagMap,
    env_flags: FlagMap,
    dependencies: Vec<Dependency>,
    resolved_commit: Option<CommitId>,
    resolved_source_path: Option<PathBuf>,
    resolved_build_path: Option<PathBuf>,
    state: LifecycleState,
    dependencies_resolved: bool,
}

impl Project {
    /// Create a project that requires a build, rooted at the default root
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            src_path: None,
            root_dir: default_root_dir(),
            build_required: true,
            build_flags: FlagMap::new(),
            env_flags: FlagMap::new(),
            dependencies: Vec::new(),
            resolved_commit: None,
            resolved_source_path: None,
            resolved_build_path: None,
            state: LifecycleState::Unfetched,
            dependencies_resolved: false,
        }
    }

    /// Set the root directory
    #[must_use]
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    /// Set whether the project needs a build
    #[must_use]
    pub fn with_build_required(mut self, build_required: bool) -> Self {
        self.build_required = build_required;
        self
    }

    /// Set the source sub-path handed to the configure step
    #[must_use]
    pub fn with_src_path(mut self, src_path: impl Into<String>) -> Self {
        self.src_path = Some(src_path.into());
        self
    }

    /// Add a build flag
    #[must_use]
    pub fn with_build_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_flags.insert(name.into(), value.into());
        self
    }

    /// Add an environment flag
    #[must_use]
    pub fn with_env_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_flags.insert(name.into(), value.into());
        self
    }

    /// Declare a dependency (order of declaration is the resolution order)
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn src_path(&self) -> Option<&str> {
        self.src_path.as_deref()
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn build_required(&self) -> bool {
        self.build_required
    }

    pub fn build_flags(&self) -> &FlagMap {
        &self.build_flags
    }

    pub fn env_flags(&self) -> &FlagMap {
        &self.env_flags
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn resolved_commit(&self) -> Option<&CommitId> {
        self.resolved_commit.as_ref()
    }

    pub fn resolved_source_path(&self) -> Option<&Path> {
        self.resolved_source_path.as_deref()
    }

    /// Build tree; only set once the project is built
    pub fn resolved_build_path(&self) -> Option<&Path> {
        self.resolved_build_path.as_deref()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether dependency flags have already been propagated into this project
    pub fn dependencies_resolved(&self) -> bool {
        self.dependencies_resolved
    }

    /// `{root}/{name}/src`
    pub fn source_dir(&self) -> PathBuf {
        self.root_dir.join(&self.name).join(defaults::SRC_DIR)
    }

    /// `{root}/{name}/build/{commit}`
    pub fn build_dir(&self, commit: &CommitId) -> PathBuf {
        self.root_dir
            .join(&self.name)
            .join(defaults::BUILD_DIR)
            .join(commit.as_str())
    }

    /// Combined configure + compile transcript for a commit
    pub fn build_log(&self, commit: &CommitId) -> PathBuf {
        self.build_dir(commit)
            .join(format!("{}.build.log", self.name))
    }

    fn effective_source_path(&self) -> PathBuf {
        let source_dir = self.source_dir();
        match &self.src_path {
            Some(sub) => source_dir.join(sub),
            None => source_dir,
        }
    }

    fn reset(&mut self) {
        self.state = LifecycleState::Unfetched;
        self.resolved_commit = None;
        self.resolved_source_path = None;
        self.resolved_build_path = None;
    }

    /// Fetch the sources into `{root}/{name}/src`
    ///
    /// A no-op once fetched unless `clean` is set. A clean fetch empties the
    /// source directory first, whatever state it was left in.
    pub fn fetch(&mut self, vcs: &dyn VersionControl, clean: bool) -> Result<(), FetchError> {
        if self.state.is_fetched() && !clean {
            tracing::debug!("{} is already fetched", self.name);
            return Ok(());
        }

        let result = self.fetch_sources(vcs, clean);
        if let Err(e) = &result {
            tracing::error!("[{}] {} failed: {}", self.name, Stage::Fetch, e);
        }
        result
    }

    fn fetch_sources(&mut self, vcs: &dyn VersionControl, clean: bool) -> Result<(), FetchError> {
        let source_dir = self.source_dir();
        let name = self.name.clone();
        let fs_error = |source| FetchError::Filesystem {
            project: name.clone(),
            source,
        };

        if clean {
            self.reset();
            if source_dir.exists() {
                tracing::warn!(
                    "Removing everything under {} for a clean fetch of {}",
                    source_dir.display(),
                    self.name
                );
                filesystem::clean_dir(&source_dir).map_err(fs_error)?;
            }
        } else {
            let record_path = ProjectRecord::fetch_path(&source_dir, &self.name);
            if let Some(record) = ProjectRecord::load_if_present(&record_path) {
                if record.matches_source(self) {
                    if let Some(commit) = record.resolved_commit {
                        tracing::info!("{} already fetched at {}", self.name, commit);
                        self.resolved_commit = Some(CommitId::new(commit));
                        self.resolved_source_path = Some(self.effective_source_path());
                        self.state = LifecycleState::Fetched;
                        return Ok(());
                    }
                }
            }
            if !filesystem::is_empty_dir(&source_dir).map_err(fs_error)? {
                return Err(FetchError::SourceDirNotEmpty {
                    project: self.name.clone(),
                    path: source_dir,
                });
            }
        }

        filesystem::create_dir_all(&source_dir).map_err(fs_error)?;

        let commit = match &self.source {
            Source::RemoteRepository { address, revision } => {
                tracing::info!("Cloning {} ({}) from {}", self.name, revision, address);
                let vcs_error = |source| FetchError::Vcs {
                    project: name.clone(),
                    source,
                };
                let repo = vcs.clone_repo(address, &source_dir).map_err(vcs_error)?;
                vcs.checkout(&repo, revision, true).map_err(vcs_error)?;
                vcs.resolved_commit(&repo.path).map_err(vcs_error)?
            }
            Source::LocalDirectory { path } => {
                if !path.is_dir() {
                    return Err(FetchError::SourceNotFound {
                        project: self.name.clone(),
                        path: path.clone(),
                    });
                }
                tracing::info!("Copying {} from {}", self.name, path.display());
                let failures = filesystem::copy_tree(path, &source_dir);
                if !failures.is_empty() {
                    return Err(FetchError::Copy {
                        project: self.name.clone(),
                        failures,
                    });
                }
                let digest = filesystem::tree_digest(path).map_err(fs_error)?;
                let short = &digest[..defaults::LOCAL_COMMIT_LEN.min(digest.len())];
                CommitId::new(format!("{}{short}", defaults::LOCAL_COMMIT_PREFIX))
            }
        };

        self.resolved_commit = Some(commit);
        self.resolved_source_path = Some(self.effective_source_path());
        self.state = LifecycleState::Fetched;

        let record_path = ProjectRecord::fetch_path(&source_dir, &self.name);
        if let Err(e) = ProjectRecord::of(self).save(&record_path) {
            self.reset();
            return Err(FetchError::Record {
                project: self.name.clone(),
                error: e.to_string(),
            });
        }

        tracing::info!(
            "Fetched {} at {}",
            self.name,
            self.resolved_commit
                .as_ref()
                .map(CommitId::as_str)
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Configure and compile into `{root}/{name}/build/{commit}`
    ///
    /// Projects that need no build succeed without touching the disk. A
    /// built project is not rebuilt.
    pub fn build(&mut self, settings: &Settings, system: BuildSystemKind) -> Result<(), BuildError> {
        if !self.build_required {
            tracing::debug!("{} needs no build", self.name);
            return Ok(());
        }
        if self.state == LifecycleState::Built {
            tracing::debug!("{} is already built", self.name);
            return Ok(());
        }

        let commit = match (&self.resolved_commit, self.state.is_fetched()) {
            (Some(commit), true) => commit.clone(),
            _ => {
                let err = BuildError::NotFetched {
                    project: self.name.clone(),
                };
                tracing::error!("[{}] {} failed: {}", self.name, Stage::Configure, err);
                return Err(err);
            }
        };

        match self.run_build(settings, system, &commit) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = LifecycleState::BuildFailed;
                self.resolved_build_path = None;
                Err(e)
            }
        }
    }

    fn run_build(
        &mut self,
        settings: &Settings,
        system: BuildSystemKind,
        commit: &CommitId,
    ) -> Result<(), BuildError> {
        let build_dir = self.build_dir(commit);
        let record_path = ProjectRecord::build_path(&build_dir, &self.name);

        if let Some(record) = ProjectRecord::load_if_present(&record_path) {
            if record.lifecycle_state == LifecycleState::Built
                && record.matches_source(self)
                && record.build_flags == self.build_flags
                && record.env_flags == self.env_flags
            {
                tracing::info!("{} already built in {}", self.name, build_dir.display());
                self.resolved_build_path = Some(build_dir);
                self.state = LifecycleState::Built;
                return Ok(());
            }
        }

        // The directory stops counting as built the moment it is reconfigured
        filesystem::create_dir_all(&build_dir)
            .and_then(|()| filesystem::remove_file_if_exists(&record_path))
            .map_err(|source| {
                let err = BuildError::Filesystem {
                    project: self.name.clone(),
                    source,
                };
                tracing::error!("[{}] {} failed: {}", self.name, Stage::Configure, err);
                err
            })?;

        let env = merge_environment(process_environment(), &[&settings.env, &self.env_flags]);
        let source_path = self
            .resolved_source_path
            .clone()
            .unwrap_or_else(|| self.effective_source_path());
        let plan = system.plan(settings, &self.build_flags, &source_path, &build_dir, &env);
        let log = self.build_log(commit);

        tracing::info!("Building {} in {}", self.name, build_dir.display());
        self.run_step(Stage::Configure, &plan.configure, &log)?;
        self.run_step(Stage::Compile, &plan.compile, &log)?;

        self.resolved_build_path = Some(build_dir);
        self.state = LifecycleState::Built;

        if let Err(e) = ProjectRecord::of(self).save(&record_path) {
            let err = BuildError::Record {
                project: self.name.clone(),
                error: e.to_string(),
            };
            tracing::error!("[{}] {} failed: {}", self.name, Stage::Compile, err);
            return Err(err);
        }

        tracing::info!("Built {}", self.name);
        Ok(())
    }

    /// Run one external step, appending its transcript to the build log
    fn run_step(
        &self,
        stage: Stage,
        invocation: &Invocation,
        log: &Path,
    ) -> Result<CapturedOutput, BuildError> {
        tracing::debug!("[{}] {}: {}", self.name, stage, invocation.command_line());

        let result = match process::run(invocation) {
            Ok(output) => {
                let logged = filesystem::append_file(log, &transcript(stage, invocation, &output));
                if !output.success() {
                    if let Err(e) = logged {
                        tracing::warn!("Could not write build log: {e}");
                    }
                    let (project, log) = (self.name.clone(), log.to_path_buf());
                    Err(match stage {
                        Stage::Configure => BuildError::ConfigureFailed {
                            project,
                            output,
                            log,
                        },
                        _ => BuildError::CompileFailed {
                            project,
                            output,
                            log,
                        },
                    })
                } else {
                    logged
                        .map(|()| output)
                        .map_err(|source| BuildError::Filesystem {
                            project: self.name.clone(),
                            source,
                        })
                }
            }
            Err(ProcessError::TimedOut {
                timeout, output, ..
            }) => {
                let mut text = transcript(stage, invocation, &output);
                text.push_str(&format!("{stage} killed after {}s\n", timeout.as_secs()));
                if let Err(e) = filesystem::append_file(log, &text) {
                    tracing::warn!("Could not write build log: {e}");
                }
                Err(BuildError::TimedOut {
                    project: self.name.clone(),
                    stage,
                    timeout,
                    output,
                })
            }
            Err(ProcessError::Launch { program, error } | ProcessError::Wait { program, error }) => {
                let text = format!("==> {stage}: {}\ncould not run: {error}\n", invocation.command_line());
                if let Err(e) = filesystem::append_file(log, &text) {
                    tracing::warn!("Could not write build log: {e}");
                }
                Err(BuildError::Launch {
                    project: self.name.clone(),
                    stage,
                    program,
                    error,
                })
            }
        };

        if let Err(e) = &result {
            tracing::error!("[{}] {} failed: {}", self.name, stage, e);
        }
        result
    }

    /// Resolve every declared dependency in order and propagate its flags
    ///
    /// Propagated values are staged and only written into this project once
    /// every dependency succeeded. Runs once per project; later calls return
    /// immediately.
    pub fn check_dependencies(
        &mut self,
        resolver: &mut dyn DependencyResolver,
    ) -> Result<(), DependencyError> {
        if self.dependencies_resolved {
            return Ok(());
        }

        let mut staged = StagedFlags {
            project: self.name.clone(),
            build_flags: self.build_flags.clone(),
            env_flags: self.env_flags.clone(),
            revision: self.source.revision().map(str::to_string),
            src_path: self.src_path.clone(),
        };

        for dependency in &self.dependencies {
            let resolved = resolver
                .resolve(&dependency.name)
                .and_then(|project| apply_rules(project, &dependency.rules, &mut staged));
            if let Err(e) = resolved {
                tracing::error!(
                    "[{}] {} from '{}' failed: {}",
                    self.name,
                    Stage::Propagate,
                    dependency.name,
                    e
                );
                return Err(e);
            }
        }

        self.commit_staged(staged);
        self.dependencies_resolved = true;
        Ok(())
    }

    fn commit_staged(&mut self, staged: StagedFlags) {
        self.build_flags = staged.build_flags;
        self.env_flags = staged.env_flags;

        if let (Source::RemoteRepository { revision, .. }, Some(new)) =
            (&mut self.source, staged.revision)
        {
            if *revision != new {
                if self.state.is_fetched() {
                    tracing::warn!(
                        "{} now targets {new}; fetch with clean to check it out",
                        self.name
                    );
                }
                *revision = new;
            }
        }

        if self.src_path != staged.src_path {
            self.src_path = staged.src_path;
            if self.state.is_fetched() {
                self.resolved_source_path = Some(self.effective_source_path());
            }
        }
    }

    /// Most advanced state record on disk for this project's current source
    ///
    /// The build record of the fetched commit when it shows a finished
    /// build, else the fetch record.
    pub fn latest_record(&self) -> Option<ProjectRecord> {
        let fetch = ProjectRecord::load_if_present(&ProjectRecord::fetch_path(
            &self.source_dir(),
            &self.name,
        ))
        .filter(|record| record.matches_source(self))?;

        let built = fetch.resolved_commit.as_ref().and_then(|commit| {
            let build_dir = self.build_dir(&CommitId::new(commit.clone()));
            ProjectRecord::load_if_present(&ProjectRecord::build_path(&build_dir, &self.name))
                .filter(|record| record.lifecycle_state == LifecycleState::Built)
        });

        built.or(Some(fetch))
    }
}

/// This process's environment as text; variables that are not UTF-8 are skipped
fn process_environment() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                tracing::debug!(
                    "Not passing {} to build steps: not valid UTF-8",
                    name.map_or_else(|n| n.to_string_lossy().into_owned(), |n| n)
                );
                None
            }
        })
        .collect()
}

fn transcript(stage: Stage, invocation: &Invocation, output: &CapturedOutput) -> String {
    format!(
        "==> {stage}: {}\n--- stdout ---\n{}\n--- stderr ---\n{}\n<== {stage}: {output}\n",
        invocation.command_line(),
        output.stdout.trim_end(),
        output.stderr.trim_end(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::propagation::TargetPath;
    use crate::core::settings::CommandSpec;
    use crate::infra::git::{RepoHandle, VcsError};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Writes a single file instead of cloning
    #[derive(Default)]
    struct FakeVcs {
        clones: Cell<usize>,
        revision: RefCell<String>,
    }

    impl VersionControl for FakeVcs {
        fn clone_repo(&self, address: &str, dest: &Path) -> Result<RepoHandle, VcsError> {
            self.clones.set(self.clones.get() + 1);
            std::fs::write(dest.join("CMakeLists.txt"), address).unwrap();
            Ok(RepoHandle {
                path: dest.to_path_buf(),
                address: address.to_string(),
            })
        }

        fn checkout(&self, _: &RepoHandle, revision: &str, _: bool) -> Result<(), VcsError> {
            *self.revision.borrow_mut() = revision.to_string();
            Ok(())
        }

        fn resolved_commit(&self, _: &Path) -> Result<CommitId, VcsError> {
            Ok(CommitId::new(format!("c0ffee-{}", self.revision.borrow())))
        }
    }

    /// Hands out projects that were prepared up front
    struct MapResolver(BTreeMap<String, Project>);

    impl DependencyResolver for MapResolver {
        fn resolve(&mut self, name: &str) -> Result<&Project, DependencyError> {
            self.0
                .get(name)
                .ok_or_else(|| DependencyError::Unresolved(name.to_string()))
        }
    }

    fn local_source(root: &Path) -> PathBuf {
        let dir = root.join("upstream");
        std::fs::create_dir_all(dir.join("include")).unwrap();
        std::fs::write(dir.join("include/atmi.h"), "#pragma once\n").unwrap();
        dir
    }

    fn sh_settings(root: &Path, configure: &str, compile: &str) -> Settings {
        Settings::default()
            .with_root_dir(root)
            .with_configure(CommandSpec::new("sh").with_args(["-c", configure, "configure"]))
            .with_compile(CommandSpec::new("sh").with_args(["-c", compile, "compile"]))
            .with_jobs(2)
    }

    #[test]
    fn test_layout() {
        let project = Project::new("ATMI", Source::remote("u", "master"))
            .with_root_dir("/r")
            .with_src_path("src");
        assert_eq!(project.source_dir(), PathBuf::from("/r/ATMI/src"));
        assert_eq!(
            project.build_log(&CommitId::new("ABC")),
            PathBuf::from("/r/ATMI/build/abc/ATMI.build.log")
        );
        assert_eq!(project.effective_source_path(), PathBuf::from("/r/ATMI/src/src"));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!(SourceKind::parse("p", "git").unwrap(), SourceKind::RemoteRepository);
        assert_eq!(SourceKind::parse("p", "dir").unwrap(), SourceKind::LocalDirectory);
        assert_eq!(
            SourceKind::parse("p", "svn").unwrap_err(),
            ConfigurationError::UnsupportedSourceKind {
                project: "p".to_string(),
                kind: "svn".to_string()
            }
        );
    }

    #[test]
    fn test_remote_fetch_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let vcs = FakeVcs::default();
        let mut project =
            Project::new("ATMI", Source::remote("https://example.com/atmi.git", "master"))
                .with_root_dir(temp.path());

        project.fetch(&vcs, false).unwrap();
        project.fetch(&vcs, false).unwrap();

        assert_eq!(vcs.clones.get(), 1);
        assert_eq!(project.state(), LifecycleState::Fetched);
        assert_eq!(project.resolved_commit().unwrap().as_str(), "c0ffee-master");
        assert!(ProjectRecord::fetch_path(&project.source_dir(), "ATMI").is_file());
    }

    #[test]
    fn test_fetch_restores_from_record() {
        let temp = TempDir::new().unwrap();
        let vcs = FakeVcs::default();
        let make = || {
            Project::new("ATMI", Source::remote("https://example.com/atmi.git", "master"))
                .with_root_dir(temp.path())
        };

        make().fetch(&vcs, false).unwrap();
        let mut again = make();
        again.fetch(&vcs, false).unwrap();

        assert_eq!(vcs.clones.get(), 1);
        assert_eq!(again.state(), LifecycleState::Fetched);
        assert_eq!(again.resolved_commit().unwrap().as_str(), "c0ffee-master");
    }

    #[test]
    fn test_fetch_refuses_foreign_source_dir() {
        let temp = TempDir::new().unwrap();
        let vcs = FakeVcs::default();
        let mut project = Project::new("ATMI", Source::remote("u", "master"))
            .with_root_dir(temp.path());
        std::fs::create_dir_all(project.source_dir()).unwrap();
        std::fs::write(project.source_dir().join("stray"), "x").unwrap();

        let err = project.fetch(&vcs, false).unwrap_err();
        assert!(matches!(err, FetchError::SourceDirNotEmpty { .. }));
        assert_eq!(vcs.clones.get(), 0);

        project.fetch(&vcs, true).unwrap();
        assert!(!project.source_dir().join("stray").exists());
        assert_eq!(vcs.clones.get(), 1);
    }

    #[test]
    fn test_local_fetch_copies_tree() {
        let temp = TempDir::new().unwrap();
        let upstream = local_source(temp.path());
        let mut project = Project::new("headers", Source::local(&upstream))
            .with_root_dir(temp.path().join("root"))
            .with_src_path("include");

        project.fetch(&FakeVcs::default(), false).unwrap();

        let source = project.resolved_source_path().unwrap();
        assert!(source.join("atmi.h").is_file());
        assert!(project
            .resolved_commit()
            .unwrap()
            .as_str()
            .starts_with(defaults::LOCAL_COMMIT_PREFIX));
    }

    #[test]
    fn test_local_fetch_missing_directory() {
        let temp = TempDir::new().unwrap();
        let mut project = Project::new("gone", Source::local(temp.path().join("nope")))
            .with_root_dir(temp.path());

        let err = project.fetch(&FakeVcs::default(), false).unwrap_err();
        assert!(matches!(err, FetchError::SourceNotFound { .. }));
        assert_eq!(project.state(), LifecycleState::Unfetched);
    }

    #[test]
    fn test_build_not_required_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let upstream = local_source(temp.path());
        let root = temp.path().join("root");
        let mut project = Project::new("headers", Source::local(&upstream))
            .with_root_dir(&root)
            .with_build_required(false);
        let settings = Settings::default().with_root_dir(&root);

        project.fetch(&FakeVcs::default(), false).unwrap();
        project.build(&settings, BuildSystemKind::CMake).unwrap();

        assert_eq!(project.state(), LifecycleState::Fetched);
        assert!(project.resolved_build_path().is_none());
        assert!(!root.join("headers").join(defaults::BUILD_DIR).exists());
    }

    #[test]
    fn test_build_before_fetch() {
        let temp = TempDir::new().unwrap();
        let mut project = Project::new("ATMI", Source::remote("u", "master"))
            .with_root_dir(temp.path());

        let err = project
            .build(&Settings::default(), BuildSystemKind::CMake)
            .unwrap_err();
        assert!(matches!(err, BuildError::NotFetched { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_success_and_short_circuit() {
        let temp = TempDir::new().unwrap();
        let settings = sh_settings(
            temp.path(),
            "echo configure \"$@\"; touch configured",
            "test -f configured && mkdir -p lib && echo compiled",
        );
        let mut project = Project::new("ATMI", Source::remote("u", "master"))
            .with_root_dir(temp.path());

        project.fetch(&FakeVcs::default(), false).unwrap();
        project.build(&settings, BuildSystemKind::CMake).unwrap();

        let build_dir = project.resolved_build_path().unwrap().to_path_buf();
        assert_eq!(project.state(), LifecycleState::Built);
        assert!(build_dir.ends_with("ATMI/build/c0ffee-master"));
        assert!(build_dir.join("lib").is_dir());
        assert!(build_dir.join("ATMI.build.json").is_file());

        let log = std::fs::read_to_string(build_dir.join("ATMI.build.log")).unwrap();
        assert!(log.contains("-DCMAKE_BUILD_TYPE=RelWithDebInfo"));
        assert!(log.contains("compiled"));

        std::fs::remove_file(build_dir.join("configured")).unwrap();
        project.build(&settings, BuildSystemKind::CMake).unwrap();
        assert!(!build_dir.join("configured").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_configure_failure_skips_compile() {
        let temp = TempDir::new().unwrap();
        let settings = sh_settings(temp.path(), "echo broken >&2; exit 3", "touch compiled");
        let mut project = Project::new("ATMI", Source::remote("u", "master"))
            .with_root_dir(temp.path());

        project.fetch(&FakeVcs::default(), false).unwrap();
        let err = project
            .build(&settings, BuildSystemKind::CMake)
            .unwrap_err();

        assert_eq!(project.state(), LifecycleState::BuildFailed);
        let BuildError::ConfigureFailed { output, log, .. } = err else {
            panic!("expected configure failure");
        };
        assert_eq!(output.exit_code, Some(3));
        assert!(output.stderr.contains("broken"));
        let build_dir = log.parent().unwrap();
        assert!(!build_dir.join("compiled").exists());
        assert!(!build_dir.join("ATMI.build.json").exists());
        assert!(std::fs::read_to_string(&log).unwrap().contains("broken"));
    }

    #[test]
    fn test_check_dependencies_propagates_source_path() {
        let temp = TempDir::new().unwrap();
        let upstream = local_source(temp.path());
        let root = temp.path().join("root");
        let mut headers = Project::new("headers", Source::local(&upstream))
            .with_root_dir(&root)
            .with_build_required(false);
        headers.fetch(&FakeVcs::default(), false).unwrap();
        let header_path = headers.resolved_source_path().unwrap().to_path_buf();

        let mut resolver = MapResolver(BTreeMap::from([("headers".to_string(), headers)]));
        let mut app = Project::new("app", Source::remote("u", "master"))
            .with_root_dir(&root)
            .with_env_flag("LD_LIBRARY_PATH", "/usr/lib")
            .with_dependency(
                Dependency::new("headers")
                    .with_rule(TargetPath::BuildFlags, "HEADERS_ROOT")
                    .with_rule(TargetPath::EnvFlags, "LD_LIBRARY_PATH"),
            );

        app.check_dependencies(&mut resolver).unwrap();

        assert_eq!(
            app.build_flags()["HEADERS_ROOT"],
            header_path.display().to_string()
        );
        assert_eq!(app.env_flags()["LD_LIBRARY_PATH"], "/usr/lib");
        assert!(app.dependencies_resolved());
    }

    #[test]
    fn test_check_dependencies_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let upstream = local_source(temp.path());
        let root = temp.path().join("root");
        let mut headers = Project::new("headers", Source::local(&upstream))
            .with_root_dir(&root)
            .with_build_required(false);
        headers.fetch(&FakeVcs::default(), false).unwrap();

        let mut resolver = MapResolver(BTreeMap::from([("headers".to_string(), headers)]));
        let mut app = Project::new("app", Source::remote("u", "master"))
            .with_root_dir(&root)
            .with_dependency(Dependency::new("headers").with_rule(TargetPath::BuildFlags, "H"))
            .with_dependency(Dependency::new("missing").with_rule(TargetPath::BuildFlags, "M"));

        let err = app.check_dependencies(&mut resolver).unwrap_err();

        assert!(matches!(err, DependencyError::Unresolved(ref name) if name == "missing"));
        assert!(app.build_flags().is_empty());
        assert!(!app.dependencies_resolved());
    }

    #[test]
    fn test_unfetched_dependency_is_not_ready() {
        let temp = TempDir::new().unwrap();
        let dep = Project::new("dep", Source::remote("u", "master")).with_root_dir(temp.path());
        let mut resolver = MapResolver(BTreeMap::from([("dep".to_string(), dep)]));
        let mut app = Project::new("app", Source::remote("u", "master"))
            .with_root_dir(temp.path())
            .with_dependency(Dependency::new("dep").with_rule(TargetPath::BuildFlags, "DEP"));

        let err = app.check_dependencies(&mut resolver).unwrap_err();
        assert!(matches!(
            err,
            DependencyError::NotReady {
                required: LifecycleState::Built,
                actual: LifecycleState::Unfetched,
                ..
            }
        ));
    }

    #[test]
    fn test_root_field_rules() {
        let temp = TempDir::new().unwrap();
        let upstream = local_source(temp.path());
        let mut dep = Project::new("dep", Source::local(&upstream))
            .with_root_dir(temp.path().join("root"))
            .with_build_required(false);
        dep.fetch(&FakeVcs::default(), false).unwrap();
        let mut resolver = MapResolver(BTreeMap::from([("dep".to_string(), dep)]));

        let mut app = Project::new("app", Source::remote("u", "master"))
            .with_root_dir(temp.path())
            .with_dependency(
                Dependency::new("dep")
                    .with_rule(TargetPath::parse("app", "revision").unwrap(), "v2.0")
                    .with_rule(TargetPath::parse("app", "src_path").unwrap(), "runtime"),
            );
        app.check_dependencies(&mut resolver).unwrap();

        assert_eq!(app.source().revision(), Some("v2.0"));
        assert_eq!(app.src_path(), Some("runtime"));
    }

    #[test]
    fn test_latest_record_prefers_build() {
        let temp = TempDir::new().unwrap();
        let vcs = FakeVcs::default();
        let mut project = Project::new("ATMI", Source::remote("u", "master"))
            .with_root_dir(temp.path());
        assert!(project.latest_record().is_none());

        project.fetch(&vcs, false).unwrap();
        let record = project.latest_record().unwrap();
        assert_eq!(record.lifecycle_state, LifecycleState::Fetched);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::BuildFailed.to_string(), "build failed");
        assert_eq!(Stage::Propagate.to_string(), "propagate");
        assert!(!LifecycleState::Unfetched.is_fetched());
        assert!(LifecycleState::BuildFailed.is_fetched());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_environment_skips_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("PROJBUILD_ENV_PLAIN", "plain");
        std::env::set_var("PROJBUILD_ENV_LATIN1", OsStr::from_bytes(b"caf\xe9"));

        let env = process_environment();

        std::env::remove_var("PROJBUILD_ENV_PLAIN");
        std::env::remove_var("PROJBUILD_ENV_LATIN1");
        assert!(env
            .iter()
            .any(|(name, value)| name == "PROJBUILD_ENV_PLAIN" && value == "plain"));
        assert!(env.iter().all(|(name, _)| name != "PROJBUILD_ENV_LATIN1"));
    }
}
