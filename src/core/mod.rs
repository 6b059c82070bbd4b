//! Core business logic module
//!
//! Project model, flag handling and dependency resolution. Side effects
//! (version control, filesystem, processes) go through [`crate::infra`].
//!
//! # Submodules
//!
//! - [`project`] - Project model and its fetch/build/dependency lifecycle
//! - [`orchestrator`] - Dependency-ordered resolution over all projects
//! - [`propagation`] - Dependency flag propagation rules
//! - [`flags`] - Build flag and environment merging
//! - [`build_system`] - Configure/compile command assembly
//! - [`settings`] - Process-wide settings
//! - [`manifest`] - Manifest (projbuild.toml) parsing and validation
//! - [`record`] - Persisted project state records

pub mod build_system;
pub mod flags;
pub mod manifest;
pub mod orchestrator;
pub mod project;
pub mod propagation;
pub mod record;
pub mod settings;
