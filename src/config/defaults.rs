//! Default configuration values

/// Manifest file looked up when none is given
pub const MANIFEST_FILE: &str = "projbuild.toml";

/// Directory under `$HOME` used as the root when nothing else is configured
pub const ROOT_SUBDIR: &str = "testing";

/// Default `CMAKE_BUILD_TYPE`
pub const BUILD_TYPE: &str = "RelWithDebInfo";

/// Flag carrying the build type
pub const BUILD_TYPE_FLAG: &str = "CMAKE_BUILD_TYPE";

/// Default configure program
pub const CONFIGURE_PROGRAM: &str = "cmake";

/// Default compile program
pub const COMPILE_PROGRAM: &str = "make";

/// Subdirectory holding fetched sources
pub const SRC_DIR: &str = "src";

/// Subdirectory holding per-commit build trees
pub const BUILD_DIR: &str = "build";

/// Subdirectory of a build tree holding libraries
pub const LIB_DIR: &str = "lib";

/// Prefix of the pseudo-commit assigned to local directory sources
pub const LOCAL_COMMIT_PREFIX: &str = "local-";

/// Hex digits of the tree digest kept in a local pseudo-commit
pub const LOCAL_COMMIT_LEN: usize = 12;

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
