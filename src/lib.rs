//! Projbuild - fetch and build interdependent source projects
//!
//! This library describes external source projects (git repositories or
//! local directories), their build configuration and their dependencies on
//! each other, and drives fetch -> configure -> compile in dependency order
//! while propagating build paths from each dependency into its dependents.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Project model, propagation and orchestration
//! - [`infra`] - Infrastructure layer (git, filesystem, processes)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
