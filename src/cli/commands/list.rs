//! CLI implementation for `projbuild list`

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::cli::commands::load;
use crate::cli::output::OutputConfig;
use crate::core::project::LifecycleState;

#[derive(Serialize)]
struct ProjectSummary {
    name: String,
    source_kind: String,
    address: String,
    state: LifecycleState,
    commit: Option<String>,
    dependencies: Vec<String>,
}

/// Execute the list command
pub fn execute(manifest: &Path, output: &OutputConfig) -> Result<()> {
    let (_, projects) = load(manifest)?;

    let summaries: Vec<ProjectSummary> = projects
        .iter()
        .map(|project| {
            let record = project.latest_record();
            ProjectSummary {
                name: project.name().to_string(),
                source_kind: project.source().kind().to_string(),
                address: project.source().address(),
                state: record
                    .as_ref()
                    .map_or(LifecycleState::Unfetched, |r| r.lifecycle_state),
                commit: record.and_then(|r| r.resolved_commit),
                dependencies: project
                    .dependencies()
                    .iter()
                    .map(|d| d.name.clone())
                    .collect(),
            }
        })
        .collect();

    if summaries.is_empty() {
        output.info("No projects declared");
    }
    for summary in &summaries {
        let mut line = format!(
            "{:<24} {:<4} {:<10}",
            summary.name,
            summary.source_kind,
            summary.state.to_string()
        );
        if let Some(commit) = &summary.commit {
            line.push_str(&format!(" {commit}"));
        }
        if !summary.dependencies.is_empty() {
            line.push_str(&format!(" (depends on {})", summary.dependencies.join(", ")));
        }
        output.line(&line);
    }
    output.json(&summaries)
}
