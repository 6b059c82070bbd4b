//! Infrastructure layer
//!
//! Handles all I/O operations: version control, filesystem, and external
//! processes.

pub mod dirs;
pub mod filesystem;
pub mod git;
pub mod process;
