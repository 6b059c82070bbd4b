//! CLI implementation for `projbuild build`

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::commands::{load, orchestrator};
use crate::cli::output::{finish_spinner, OutputConfig};
use crate::core::record::ProjectRecord;

/// Build command options
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Skip dependency resolution
    pub no_deps: bool,
    /// Compile parallelism override
    pub jobs: Option<usize>,
    /// Step timeout in seconds
    pub timeout: Option<u64>,
}

/// Execute the build command
pub fn execute(
    manifest: &Path,
    name: &str,
    options: &BuildOptions,
    output: &OutputConfig,
) -> Result<()> {
    let (mut settings, projects) = load(manifest)?;
    if let Some(jobs) = options.jobs {
        settings = settings.with_jobs(jobs);
    }
    if let Some(secs) = options.timeout {
        settings = settings.with_timeout(Some(Duration::from_secs(secs)));
    }
    let mut orchestrator = orchestrator(settings, projects)?;

    let spinner = output.spinner(&format!("Building {name}..."));
    let result = if options.no_deps {
        orchestrator
            .fetch(name, false)
            .and_then(|()| orchestrator.build(name))
    } else {
        orchestrator.build_with_dependencies(name)
    };
    finish_spinner(spinner);
    result.with_context(|| format!("Failed to build {name}"))?;

    let project = orchestrator.project(name)?;
    match project.resolved_build_path() {
        Some(path) => output.success(&format!("Built {name} in {}", path.display())),
        None => {
            let sources = project
                .resolved_source_path()
                .map_or_else(|| project.source_dir(), Path::to_path_buf);
            output.success(&format!(
                "{name} needs no build; sources are in {}",
                sources.display()
            ));
        }
    }
    output.json(&ProjectRecord::of(project))
}
