//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying spinners, status lines and
//! error chains to the user.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::error::{BuildError, DependencyError, ProjbuildError};

/// Lines of captured stderr shown under a failed build step
const STDERR_TAIL_LINES: usize = 20;

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// How command results are presented
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress everything but errors
    pub quiet: bool,
    /// Print machine-readable JSON instead of text
    pub json: bool,
    /// Verbosity level from `-v` flags
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Spinner for interactive text output; none when quiet or emitting JSON
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        (!self.quiet && !self.json).then(|| create_spinner(message))
    }

    /// Print a success line
    pub fn success(&self, message: &str) {
        if !self.quiet && !self.json {
            println!("{} {message}", status::SUCCESS);
        }
    }

    /// Print an informational line
    pub fn info(&self, message: &str) {
        if !self.quiet && !self.json {
            println!("{} {message}", status::INFO);
        }
    }

    /// Print plain text
    pub fn line(&self, message: &str) {
        if !self.quiet && !self.json {
            println!("{message}");
        }
    }

    /// Print a value as pretty JSON when in JSON mode
    pub fn json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }
}

/// Finish a spinner, if any
pub fn finish_spinner(spinner: Option<ProgressBar>) {
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
}

fn build_error(error: &anyhow::Error) -> Option<&BuildError> {
    for cause in error.chain() {
        if let Some(ProjbuildError::Build(e)) = cause.downcast_ref::<ProjbuildError>() {
            return Some(e);
        }
        if let Some(DependencyError::BuildFailed { source, .. }) = cause.downcast_ref::<DependencyError>()
        {
            return Some(source.as_ref());
        }
        if let Some(e) = cause.downcast_ref::<BuildError>() {
            return Some(e);
        }
    }
    None
}

/// Print an error and its causes to stderr
///
/// Failed build steps also get the tail of their captured stderr.
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }

    if let Some(output) = build_error(error).and_then(BuildError::output) {
        let lines: Vec<&str> = output.stderr.lines().collect();
        if !lines.is_empty() {
            eprintln!("{} Last lines of stderr:", status::WARNING);
            for line in &lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..] {
                eprintln!("    {line}");
            }
        }
    }
}
