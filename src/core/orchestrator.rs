//! Dependency-ordered fetch and build
//!
//! The orchestrator owns every declared project. Resolving a project walks its
//! dependencies in declaration order, recursively resolving each one (its own
//! dependencies, then fetch, then build) before propagating flags into the
//! dependent. Nothing runs concurrently.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::manifest::load_manifest;
use crate::core::project::{DependencyResolver, Project};
use crate::core::settings::Settings;
use crate::error::{ConfigurationError, DependencyError, ProjbuildError};
use crate::infra::git::VersionControl;

/// Drives projects through fetch, dependency propagation and build
pub struct Orchestrator {
    settings: Settings,
    vcs: Box<dyn VersionControl>,
    projects: BTreeMap<String, Project>,
    /// Declaration order
    order: Vec<String>,
    /// Projects currently being resolved, outermost first
    in_progress: Vec<String>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("projects", &self.order)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with no projects
    pub fn new(settings: Settings, vcs: Box<dyn VersionControl>) -> Self {
        Self {
            settings,
            vcs,
            projects: BTreeMap::new(),
            order: Vec::new(),
            in_progress: Vec::new(),
        }
    }

    /// Load settings and projects from a manifest file
    pub fn from_manifest(path: &Path, vcs: Box<dyn VersionControl>) -> Result<Self, ProjbuildError> {
        let (settings, projects) = load_manifest(path)?;
        let mut orchestrator = Self::new(settings, vcs);
        for project in projects {
            orchestrator.add_project(project)?;
        }
        Ok(orchestrator)
    }

    /// Register a project
    pub fn add_project(&mut self, project: Project) -> Result<(), ConfigurationError> {
        let name = project.name().to_string();
        if self.projects.contains_key(&name) {
            return Err(ConfigurationError::DuplicateProject { name });
        }
        self.order.push(name.clone());
        self.projects.insert(name, project);
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Look up a project
    pub fn project(&self, name: &str) -> Result<&Project, ProjbuildError> {
        self.projects
            .get(name)
            .ok_or_else(|| ProjbuildError::UnknownProject {
                name: name.to_string(),
            })
    }

    /// All projects in declaration order
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.order.iter().filter_map(|name| self.projects.get(name))
    }

    /// Fetch one project (dependencies are not touched)
    pub fn fetch(&mut self, name: &str, clean: bool) -> Result<(), ProjbuildError> {
        let vcs = self.vcs.as_ref();
        let project = self
            .projects
            .get_mut(name)
            .ok_or_else(|| ProjbuildError::UnknownProject {
                name: name.to_string(),
            })?;
        project.fetch(vcs, clean)?;
        Ok(())
    }

    /// Build one already-fetched project (dependencies are not touched)
    pub fn build(&mut self, name: &str) -> Result<(), ProjbuildError> {
        let settings = &self.settings;
        let project = self
            .projects
            .get_mut(name)
            .ok_or_else(|| ProjbuildError::UnknownProject {
                name: name.to_string(),
            })?;
        project.build(settings, settings.build_system)?;
        Ok(())
    }

    /// Resolve a project's dependencies and propagate their flags into it
    pub fn check_dependencies(&mut self, name: &str) -> Result<(), ProjbuildError> {
        self.with_project(name, |orchestrator, project| {
            project.check_dependencies(orchestrator)?;
            Ok(())
        })
    }

    /// Resolve dependencies, then fetch and build the project itself
    pub fn build_with_dependencies(&mut self, name: &str) -> Result<(), ProjbuildError> {
        self.with_project(name, |orchestrator, project| {
            project.check_dependencies(orchestrator)?;
            project.fetch(orchestrator.vcs.as_ref(), false)?;
            project.build(&orchestrator.settings, orchestrator.settings.build_system)?;
            Ok(())
        })
    }

    /// Run `f` on a project taken out of the map, marking it in progress
    ///
    /// The project is put back whatever `f` returns.
    fn with_project<F>(&mut self, name: &str, f: F) -> Result<(), ProjbuildError>
    where
        F: FnOnce(&mut Self, &mut Project) -> Result<(), ProjbuildError>,
    {
        self.check_cycle(name)?;
        let mut project =
            self.projects
                .remove(name)
                .ok_or_else(|| ProjbuildError::UnknownProject {
                    name: name.to_string(),
                })?;

        self.in_progress.push(name.to_string());
        let result = f(self, &mut project);
        self.in_progress.pop();
        self.projects.insert(name.to_string(), project);
        result
    }

    fn check_cycle(&self, name: &str) -> Result<(), ConfigurationError> {
        match self.in_progress.iter().position(|n| n == name) {
            Some(start) => {
                let mut cycle = self.in_progress[start..].to_vec();
                cycle.push(name.to_string());
                Err(ConfigurationError::CyclicDependency { cycle })
            }
            None => Ok(()),
        }
    }
}

impl DependencyResolver for Orchestrator {
    fn resolve(&mut self, name: &str) -> Result<&Project, DependencyError> {
        self.check_cycle(name)?;
        let mut project = self
            .projects
            .remove(name)
            .ok_or_else(|| DependencyError::Unresolved(name.to_string()))?;

        self.in_progress.push(name.to_string());
        let result = prepare_dependency(self, &mut project);
        self.in_progress.pop();
        self.projects.insert(name.to_string(), project);
        result?;

        self.projects
            .get(name)
            .ok_or_else(|| DependencyError::Unresolved(name.to_string()))
    }
}

/// Bring a dependency to a usable state: its dependencies, fetch, build
fn prepare_dependency(
    orchestrator: &mut Orchestrator,
    project: &mut Project,
) -> Result<(), DependencyError> {
    project.check_dependencies(orchestrator)?;
    project
        .fetch(orchestrator.vcs.as_ref(), false)
        .map_err(|e| DependencyError::FetchFailed {
            name: project.name().to_string(),
            source: Box::new(e),
        })?;
    project
        .build(&orchestrator.settings, orchestrator.settings.build_system)
        .map_err(|e| DependencyError::BuildFailed {
            name: project.name().to_string(),
            source: Box::new(e),
        })
}
