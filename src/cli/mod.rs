//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::{build_info, defaults};
use commands::Commands;
use output::OutputConfig;

/// Projbuild - fetch and build interdependent source projects
///
/// Clones or copies each project, resolves its dependencies in declaration
/// order, and configures and compiles it with the dependency paths applied.
#[derive(Parser, Debug)]
#[command(name = "projbuild")]
#[command(author, version, about, long_about = None)]
#[command(long_version = build_info::long_version())]
#[command(propagate_version = true)]
pub struct Cli {
    /// Manifest declaring settings and projects
    #[arg(
        short,
        long,
        global = true,
        env = "PROJBUILD_MANIFEST",
        default_value = defaults::MANIFEST_FILE
    )]
    pub manifest: PathBuf,

    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputConfig::new(self.quiet, self.json, self.verbose);
        if let Some(cmd) = self.command {
            cmd.run(&self.manifest, &output)
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}
