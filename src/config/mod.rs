//! Configuration constants

pub mod build_info;
pub mod defaults;
