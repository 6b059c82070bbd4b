//! CLI implementation for `projbuild deps`

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::commands::{load, orchestrator};
use crate::cli::output::{finish_spinner, OutputConfig};
use crate::core::flags::FlagMap;

#[derive(Serialize)]
struct PropagatedFlags<'a> {
    project: &'a str,
    dependencies: Vec<&'a str>,
    build_flags: &'a FlagMap,
    env_flags: &'a FlagMap,
}

/// Execute the deps command
pub fn execute(manifest: &Path, name: &str, output: &OutputConfig) -> Result<()> {
    let (settings, projects) = load(manifest)?;
    let mut orchestrator = orchestrator(settings, projects)?;

    let spinner = output.spinner(&format!("Resolving dependencies of {name}..."));
    let result = orchestrator.check_dependencies(name);
    finish_spinner(spinner);
    result.with_context(|| format!("Failed to resolve dependencies of {name}"))?;

    let project = orchestrator.project(name)?;
    let flags = PropagatedFlags {
        project: project.name(),
        dependencies: project
            .dependencies()
            .iter()
            .map(|d| d.name.as_str())
            .collect(),
        build_flags: project.build_flags(),
        env_flags: project.env_flags(),
    };

    if flags.dependencies.is_empty() {
        output.info(&format!("{name} has no dependencies"));
    } else {
        output.success(&format!(
            "Resolved {} for {name}",
            flags.dependencies.join(", ")
        ));
    }
    output.line("Build flags:");
    for (key, value) in flags.build_flags {
        output.line(&format!("    {key}={value}"));
    }
    output.line("Environment:");
    for (key, value) in flags.env_flags {
        output.line(&format!("    {key}={value}"));
    }
    output.json(&flags)
}
