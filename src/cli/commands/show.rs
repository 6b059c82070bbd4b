//! CLI implementation for `projbuild show`

use std::path::Path;

use anyhow::Result;

use crate::cli::commands::load;
use crate::cli::output::OutputConfig;
use crate::error::ProjbuildError;

/// Execute the show command
pub fn execute(manifest: &Path, name: &str, output: &OutputConfig) -> Result<()> {
    let (_, projects) = load(manifest)?;
    let project = projects
        .iter()
        .find(|p| p.name() == name)
        .ok_or_else(|| ProjbuildError::UnknownProject {
            name: name.to_string(),
        })?;

    let Some(record) = project.latest_record() else {
        anyhow::bail!("{name} has no state record yet; run 'projbuild fetch {name}' first");
    };

    if output.json {
        return output.json(&record);
    }
    output.line(&format!("name:        {}", record.name));
    output.line(&format!("source:      {} {}", record.source_kind, record.address));
    if let Some(revision) = &record.revision {
        output.line(&format!("revision:    {revision}"));
    }
    output.line(&format!("state:       {}", record.lifecycle_state));
    if let Some(commit) = &record.resolved_commit {
        output.line(&format!("commit:      {commit}"));
    }
    if let Some(path) = &record.resolved_source_path {
        output.line(&format!("sources:     {}", path.display()));
    }
    if let Some(path) = &record.resolved_build_path {
        output.line(&format!("build:       {}", path.display()));
    }
    for (key, value) in &record.build_flags {
        output.line(&format!("build flag:  {key}={value}"));
    }
    for (key, value) in &record.env_flags {
        output.line(&format!("env:         {key}={value}"));
    }
    Ok(())
}
