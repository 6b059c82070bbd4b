//! Dependency flag propagation
//!
//! A dependency declares rules `target path -> flag name`. Once the dependency
//! is usable, each rule writes a value derived from it (its build tree, its
//! source tree, or its library directory) into the dependent project.
//!
//! Rules are applied to a [`StagedFlags`] copy and only committed by the
//! caller after every dependency succeeded, so a failure never leaves a
//! half-propagated flag set behind.

use std::fmt;
use std::path::PathBuf;

use crate::config::defaults;
use crate::core::flags::{is_library_search_path, prepend_path, FlagMap};
use crate::core::project::{LifecycleState, Project};
use crate::error::{ConfigurationError, DependencyError};

/// Top-level project fields a rule may overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootField {
    /// Revision to check out
    Revision,
    /// Sub-path of the source tree handed to the configure step
    SrcPath,
}

/// Where a propagated value is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetPath {
    /// A root-level field, set to the rule's literal value
    Root(RootField),
    /// `flags.build`
    BuildFlags,
    /// `flags.env`
    EnvFlags,
}

impl TargetPath {
    /// Parse a dotted target path as written in a manifest
    pub fn parse(project: &str, path: &str) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidPropagationPath {
            project: project.to_string(),
            path: path.to_string(),
        };

        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            ["revision" | "branch_or_commit"] => Ok(Self::Root(RootField::Revision)),
            ["src_path"] => Ok(Self::Root(RootField::SrcPath)),
            ["flags", "build"] => Ok(Self::BuildFlags),
            ["flags", "env"] => Ok(Self::EnvFlags),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(RootField::Revision) => f.write_str("revision"),
            Self::Root(RootField::SrcPath) => f.write_str("src_path"),
            Self::BuildFlags => f.write_str("flags.build"),
            Self::EnvFlags => f.write_str("flags.env"),
        }
    }
}

/// One `target -> flag` rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationRule {
    /// Where to write
    pub target: TargetPath,
    /// Flag name (or literal value for root fields)
    pub flag: String,
}

impl PropagationRule {
    /// Create a rule
    pub fn new(target: TargetPath, flag: impl Into<String>) -> Self {
        Self {
            target,
            flag: flag.into(),
        }
    }
}

/// A declared dependency: which project, and what to take from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name of the project depended on
    pub name: String,
    /// Propagation rules, applied in order
    pub rules: Vec<PropagationRule>,
}

impl Dependency {
    /// Dependency with no rules
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Add a rule
    #[must_use]
    pub fn with_rule(mut self, target: TargetPath, flag: impl Into<String>) -> Self {
        self.rules.push(PropagationRule::new(target, flag));
        self
    }
}

/// Working copy of the fields propagation may touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFlags {
    /// Name of the dependent project
    pub project: String,
    /// Build flags
    pub build_flags: FlagMap,
    /// Environment flags
    pub env_flags: FlagMap,
    /// Revision (None for sources that have no revision)
    pub revision: Option<String>,
    /// Source sub-path
    pub src_path: Option<String>,
}

/// Value a dependency offers: its build tree if it is built, else its sources
fn resolved_path(dependency: &Project) -> Result<PathBuf, DependencyError> {
    let (required, ready, path) = if dependency.build_required() {
        (
            LifecycleState::Built,
            dependency.state() == LifecycleState::Built,
            dependency.resolved_build_path(),
        )
    } else {
        (
            LifecycleState::Fetched,
            dependency.state().is_fetched(),
            dependency.resolved_source_path(),
        )
    };

    match path {
        Some(path) if ready => Ok(path.to_path_buf()),
        _ => Err(DependencyError::NotReady {
            name: dependency.name().to_string(),
            required,
            actual: dependency.state(),
        }),
    }
}

/// Apply a dependency's rules to the staged flags
pub fn apply_rules(
    dependency: &Project,
    rules: &[PropagationRule],
    staged: &mut StagedFlags,
) -> Result<(), DependencyError> {
    for rule in rules {
        match rule.target {
            TargetPath::Root(RootField::Revision) => {
                if staged.revision.is_none() {
                    return Err(ConfigurationError::InvalidPropagationPath {
                        project: staged.project.clone(),
                        path: rule.target.to_string(),
                    }
                    .into());
                }
                staged.revision = Some(rule.flag.clone());
            }
            TargetPath::Root(RootField::SrcPath) => {
                staged.src_path = Some(rule.flag.clone());
            }
            TargetPath::BuildFlags => {
                let value = resolved_path(dependency)?;
                staged
                    .build_flags
                    .insert(rule.flag.clone(), value.display().to_string());
            }
            TargetPath::EnvFlags if is_library_search_path(&rule.flag) => {
                if !dependency.build_required() {
                    tracing::debug!(
                        "{} is not built, no library path to add to {} of {}",
                        dependency.name(),
                        rule.flag,
                        staged.project
                    );
                    continue;
                }
                let lib_dir = resolved_path(dependency)?.join(defaults::LIB_DIR);
                let existing = staged.env_flags.get(&rule.flag).map(String::as_str);
                let value = prepend_path(existing, &lib_dir.display().to_string());
                staged.env_flags.insert(rule.flag.clone(), value);
            }
            TargetPath::EnvFlags => {
                let value = resolved_path(dependency)?;
                staged
                    .env_flags
                    .insert(rule.flag.clone(), value.display().to_string());
            }
        }
        tracing::debug!(
            "Propagated {} of {} into {} of {}",
            rule.flag,
            dependency.name(),
            rule.target,
            staged.project
        );
    }
    Ok(())
}
