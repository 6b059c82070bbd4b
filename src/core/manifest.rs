//! Manifest (projbuild.toml) parsing and validation
//!
//! The manifest declares process-wide settings and every project. `${VAR}`
//! patterns in string values are replaced from the environment before the
//! document is interpreted.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::build_system::BuildSystemKind;
use crate::core::flags::FlagMap;
use crate::core::project::{Project, Source, SourceKind};
use crate::core::propagation::{Dependency, TargetPath};
use crate::core::settings::{CommandSpec, Settings};
use crate::error::{ConfigurationError, ProjbuildError};
use crate::infra::filesystem;

/// The manifest document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Process-wide settings
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Declared projects, in order
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectConfig>,
}

/// `[settings]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsConfig {
    #[serde(default)]
    pub root_dir: Option<String>,
    #[serde(default)]
    pub build_system: Option<String>,
    /// Shorthand for `build_flags.CMAKE_BUILD_TYPE`
    #[serde(default)]
    pub build_type: Option<String>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub build_flags: FlagMap,
    #[serde(default)]
    pub env: FlagMap,
    #[serde(default)]
    pub configure: Option<CommandConfig>,
    #[serde(default)]
    pub compile: Option<CommandConfig>,
}

/// External command override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `[[project]]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Unique project name
    pub name: String,

    /// `git` or `dir`
    #[serde(rename = "type")]
    pub kind: String,

    /// Repository URL or local path (relative paths are taken from the manifest directory)
    pub address: String,

    /// Branch or commit to check out
    #[serde(default, alias = "branch_or_commit")]
    pub revision: Option<String>,

    /// Whether the project needs a build
    #[serde(default = "default_build")]
    pub build: bool,

    #[serde(default)]
    pub src_path: Option<String>,

    /// Per-project root override
    #[serde(default)]
    pub root_dir: Option<String>,

    #[serde(default)]
    pub flags: FlagsConfig,

    #[serde(default)]
    pub deps: Vec<DependencyConfig>,
}

fn default_build() -> bool {
    true
}

/// `[project.flags]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlagsConfig {
    #[serde(default)]
    pub build: FlagMap,
    #[serde(default)]
    pub env: FlagMap,
}

/// `[[project.deps]]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyConfig {
    pub name: String,
    /// Target path -> flag name(s)
    #[serde(default)]
    pub propagate: BTreeMap<String, FlagNames>,
}

/// One flag name or several
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FlagNames {
    One(String),
    Many(Vec<String>),
}

impl FlagNames {
    fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Substitute `${VAR}` patterns with environment variable values.
///
/// Unset variables expand to the empty string.
///
/// # Examples
/// ```
/// use projbuild::core::manifest::substitute_env_vars;
///
/// std::env::set_var("PROJBUILD_DOC_VAR", "hello");
/// let result = substitute_env_vars("prefix_${PROJBUILD_DOC_VAR}_suffix").unwrap();
/// assert_eq!(result, "prefix_hello_suffix");
/// std::env::remove_var("PROJBUILD_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, String> {
    Ok(substitute_with(&env_var_pattern()?, input))
}

fn env_var_pattern() -> Result<Regex, String> {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| format!("Invalid regex: {e}"))
}

fn substitute_with(re: &Regex, input: &str) -> String {
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

/// Recursively substitute in every string of a TOML value
fn substitute_in_value(re: &Regex, value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => *s = substitute_with(re, s),
        toml::Value::Array(items) => {
            for item in items {
                substitute_in_value(re, item);
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(re, v);
            }
        }
        _ => {}
    }
}

fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

impl Manifest {
    /// Load a manifest file with environment substitution
    pub fn load(path: &Path) -> Result<Self, ProjbuildError> {
        if !path.is_file() {
            return Err(ProjbuildError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = filesystem::read_file(path)?;
        Self::from_toml_with_env(&content)
    }

    /// Parse manifest text, substituting `${VAR}` in every string value
    pub fn from_toml_with_env(content: &str) -> Result<Self, ProjbuildError> {
        let mut value: toml::Value = toml::from_str(content)
            .map_err(|source| ProjbuildError::ManifestParse { source })?;
        let re = env_var_pattern().map_err(ProjbuildError::Manifest)?;
        substitute_in_value(&re, &mut value);
        value
            .try_into()
            .map_err(|source| ProjbuildError::ManifestParse { source })
    }

    /// Parse manifest text without substitution
    #[cfg(test)]
    fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Build the settings value; relative paths are resolved against `base_dir`
    pub fn settings(&self, base_dir: &Path) -> Result<Settings, ConfigurationError> {
        let config = &self.settings;
        let mut settings = Settings::default();

        if let Some(root) = &config.root_dir {
            settings.root_dir = resolve_path(base_dir, root);
        }
        if let Some(system) = &config.build_system {
            settings.build_system = system.parse::<BuildSystemKind>()?;
        }
        if let Some(build_type) = &config.build_type {
            settings = settings.with_build_flag(crate::config::defaults::BUILD_TYPE_FLAG, build_type);
        }
        settings
            .build_flags
            .extend(config.build_flags.iter().map(|(k, v)| (k.clone(), v.clone())));
        settings
            .env
            .extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(command) = &config.configure {
            settings.configure = CommandSpec::new(&command.program).with_args(command.args.clone());
        }
        if let Some(command) = &config.compile {
            settings.compile = CommandSpec::new(&command.program).with_args(command.args.clone());
        }
        if let Some(jobs) = config.jobs {
            settings = settings.with_jobs(jobs);
        }
        if let Some(secs) = config.timeout_secs {
            settings.timeout = Some(Duration::from_secs(secs));
        }
        Ok(settings)
    }

    /// Build every declared project, validating as it goes
    pub fn projects(
        &self,
        settings: &Settings,
        base_dir: &Path,
    ) -> Result<Vec<Project>, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut projects = Vec::with_capacity(self.projects.len());

        for config in &self.projects {
            if !seen.insert(config.name.as_str()) {
                return Err(ConfigurationError::DuplicateProject {
                    name: config.name.clone(),
                });
            }
            projects.push(config.to_project(settings, base_dir)?);
        }
        Ok(projects)
    }
}

impl ProjectConfig {
    fn to_project(&self, settings: &Settings, base_dir: &Path) -> Result<Project, ConfigurationError> {
        let source = match SourceKind::parse(&self.name, &self.kind)? {
            SourceKind::RemoteRepository => {
                let revision =
                    self.revision
                        .clone()
                        .ok_or_else(|| ConfigurationError::MissingField {
                            project: self.name.clone(),
                            field: "revision".to_string(),
                        })?;
                Source::remote(&self.address, revision)
            }
            SourceKind::LocalDirectory => Source::local(resolve_path(base_dir, &self.address)),
        };

        let root_dir = self
            .root_dir
            .as_deref()
            .map_or_else(|| settings.root_dir.clone(), |root| resolve_path(base_dir, root));

        let mut project = Project::new(&self.name, source)
            .with_root_dir(root_dir)
            .with_build_required(self.build);
        if let Some(src_path) = &self.src_path {
            project = project.with_src_path(src_path);
        }
        for (name, value) in &self.flags.build {
            project = project.with_build_flag(name, value);
        }
        for (name, value) in &self.flags.env {
            project = project.with_env_flag(name, value);
        }

        for dep in &self.deps {
            let mut dependency = Dependency::new(&dep.name);
            for (path, flags) in &dep.propagate {
                let target = TargetPath::parse(&self.name, path)?;
                for flag in flags.names() {
                    dependency = dependency.with_rule(target, flag);
                }
            }
            project = project.with_dependency(dependency);
        }

        Ok(project)
    }
}

/// Absolute directory holding the manifest; relative paths resolve against it
fn manifest_dir(path: &Path) -> Result<PathBuf, ProjbuildError> {
    let parent = path.parent().unwrap_or(Path::new(""));
    if parent.is_absolute() {
        return Ok(parent.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ProjbuildError::Manifest(format!("cannot resolve working directory: {e}")))?;
    Ok(if parent.as_os_str().is_empty() {
        cwd
    } else {
        cwd.join(parent)
    })
}

/// Read a manifest and produce the settings and projects it declares
pub fn load_manifest(path: &Path) -> Result<(Settings, Vec<Project>), ProjbuildError> {
    let manifest = Manifest::load(path)?;
    let base_dir = manifest_dir(path)?;
    let settings = manifest.settings(&base_dir)?;
    let projects = manifest.projects(&settings, &base_dir)?;
    tracing::debug!(
        "Loaded {} projects from {}",
        projects.len(),
        path.display()
    );
    Ok((settings, projects))
}
