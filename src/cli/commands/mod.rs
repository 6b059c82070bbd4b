//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod deps;
pub mod fetch;
pub mod list;
pub mod show;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::OutputConfig;
use crate::core::manifest::load_manifest;
use crate::core::orchestrator::Orchestrator;
use crate::core::project::Project;
use crate::core::settings::Settings;
use crate::infra::git::GitClient;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a project's sources
    Fetch {
        /// Project name
        project: String,

        /// Empty the source directory and fetch again
        #[arg(long)]
        clean: bool,
    },

    /// Build a project, resolving its dependencies first
    Build {
        /// Project name
        project: String,

        /// Do not resolve dependencies; fetch and build only this project
        #[arg(long)]
        no_deps: bool,

        /// Number of parallel compile jobs (default: physical cores)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Kill the configure or compile step after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Resolve a project's dependencies and show the propagated flags
    Deps {
        /// Project name
        project: String,
    },

    /// List declared projects and their state on disk
    List,

    /// Show the latest state record of a project
    Show {
        /// Project name
        project: String,
    },
}

impl Commands {
    /// Execute the command
    pub fn run(self, manifest: &Path, output: &OutputConfig) -> Result<()> {
        match self {
            Self::Fetch { project, clean } => fetch::execute(manifest, &project, clean, output),
            Self::Build {
                project,
                no_deps,
                jobs,
                timeout,
            } => {
                let options = build::BuildOptions {
                    no_deps,
                    jobs,
                    timeout,
                };
                build::execute(manifest, &project, &options, output)
            }
            Self::Deps { project } => deps::execute(manifest, &project, output),
            Self::List => list::execute(manifest, output),
            Self::Show { project } => show::execute(manifest, &project, output),
        }
    }
}

/// Load the manifest, attaching its path to any error
pub(crate) fn load(manifest: &Path) -> Result<(Settings, Vec<Project>)> {
    load_manifest(manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))
}

/// Orchestrator over the manifest's projects using the real git client
pub(crate) fn orchestrator(settings: Settings, projects: Vec<Project>) -> Result<Orchestrator> {
    let mut orchestrator = Orchestrator::new(settings, Box::new(GitClient::new()));
    for project in projects {
        orchestrator.add_project(project)?;
    }
    Ok(orchestrator)
}
