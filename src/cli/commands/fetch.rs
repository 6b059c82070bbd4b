//! CLI implementation for `projbuild fetch`

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::commands::{load, orchestrator};
use crate::cli::output::{finish_spinner, OutputConfig};
use crate::core::record::ProjectRecord;

/// Execute the fetch command
pub fn execute(manifest: &Path, name: &str, clean: bool, output: &OutputConfig) -> Result<()> {
    let (settings, projects) = load(manifest)?;
    let mut orchestrator = orchestrator(settings, projects)?;

    let spinner = output.spinner(&format!("Fetching {name}..."));
    let result = orchestrator.fetch(name, clean);
    finish_spinner(spinner);
    result.with_context(|| format!("Failed to fetch {name}"))?;

    let project = orchestrator.project(name)?;
    output.success(&format!(
        "Fetched {name} at {} into {}",
        project
            .resolved_commit()
            .map_or_else(|| "unknown".to_string(), ToString::to_string),
        project.source_dir().display()
    ));
    output.json(&ProjectRecord::of(project))
}
