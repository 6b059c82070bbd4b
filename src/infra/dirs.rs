//! Default directory locations
//!
//! The root directory holds every project's `src` and `build` trees. It can be
//! overridden per manifest and per project; this module only supplies the
//! fallback.
//!
//! Environment variables:
//! - `PROJBUILD_ROOT_DIR` - Override the default root directory

use std::env;
use std::path::PathBuf;

use crate::config::defaults;

/// Environment variable name for the root directory override
pub const ENV_ROOT_DIR: &str = "PROJBUILD_ROOT_DIR";

/// Default root directory for fetched sources and builds
///
/// `$PROJBUILD_ROOT_DIR` if set, otherwise `~/testing`.
pub fn default_root_dir() -> PathBuf {
    if let Ok(path) = env::var(ENV_ROOT_DIR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(defaults::ROOT_SUBDIR)
}
