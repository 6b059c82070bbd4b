//! Build system selection and command assembly
//!
//! Only one build system exists today: configure with CMake, then compile
//! with make. Keeping it an enum means a new system is a compile error at
//! every dispatch site until it is handled.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::core::flags::{merge_build_flags, FlagMap};
use crate::core::settings::Settings;
use crate::error::ConfigurationError;
use crate::infra::process::Invocation;

/// Supported build systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildSystemKind {
    /// `cmake <flags> <src>` followed by `make -j N`
    CMake,
}

impl FromStr for BuildSystemKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cmake" => Ok(Self::CMake),
            _ => Err(ConfigurationError::UnsupportedBuildSystem {
                system: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CMake => f.write_str("cmake"),
        }
    }
}

/// Everything needed to launch a project's configure and compile steps
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    /// Configure invocation
    pub configure: Invocation,
    /// Compile invocation
    pub compile: Invocation,
}

impl BuildSystemKind {
    /// Assemble the configure and compile invocations for a project
    pub fn plan(
        self,
        settings: &Settings,
        build_flags: &FlagMap,
        source_dir: &Path,
        build_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> BuildPlan {
        match self {
            Self::CMake => {
                let defines = merge_build_flags(&settings.build_flags, build_flags)
                    .into_iter()
                    .map(|(name, value)| format!("-D{name}={value}"));

                let configure = Invocation::new(settings.configure.program.clone(), build_dir)
                    .with_args(settings.configure.args.iter().cloned())
                    .with_args(defines)
                    .with_args([source_dir.display().to_string()]);

                let compile = Invocation::new(settings.compile.program.clone(), build_dir)
                    .with_args(settings.compile.args.iter().cloned())
                    .with_args(["-j".to_string(), settings.jobs.to_string()]);

                BuildPlan {
                    configure: with_env_and_timeout(configure, env, settings.timeout),
                    compile: with_env_and_timeout(compile, env, settings.timeout),
                }
            }
        }
    }
}

fn with_env_and_timeout(
    invocation: Invocation,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Invocation {
    invocation.with_env(env.clone()).with_timeout(timeout)
}
