//! Process-wide build settings
//!
//! One explicit value handed to the orchestrator at construction time. It
//! carries the defaults every project build starts from.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::defaults;
use crate::core::build_system::BuildSystemKind;
use crate::core::flags::FlagMap;
use crate::infra::dirs::default_root_dir;

/// An external command: program plus leading arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run
    pub program: String,
    /// Arguments placed before the generated ones
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Command with no leading arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add leading arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Settings shared by every project
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Root under which `{name}/src` and `{name}/build` live
    pub root_dir: PathBuf,
    /// Build system used for every build
    pub build_system: BuildSystemKind,
    /// Default configure flags
    pub build_flags: FlagMap,
    /// Environment additions applied to every build
    pub env: FlagMap,
    /// Configure command
    pub configure: CommandSpec,
    /// Compile command
    pub compile: CommandSpec,
    /// Parallelism hint handed to the compile command
    pub jobs: usize,
    /// Kill configure/compile after this long
    pub timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut build_flags = FlagMap::new();
        build_flags.insert(
            defaults::BUILD_TYPE_FLAG.to_string(),
            defaults::BUILD_TYPE.to_string(),
        );

        Self {
            root_dir: default_root_dir(),
            build_system: BuildSystemKind::CMake,
            build_flags,
            env: FlagMap::new(),
            configure: CommandSpec::new(defaults::CONFIGURE_PROGRAM),
            compile: CommandSpec::new(defaults::COMPILE_PROGRAM),
            jobs: num_cpus::get_physical().max(1),
            timeout: None,
        }
    }
}

impl Settings {
    /// Set the root directory
    #[must_use]
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    /// Set the configure command
    #[must_use]
    pub fn with_configure(mut self, command: CommandSpec) -> Self {
        self.configure = command;
        self
    }

    /// Set the compile command
    #[must_use]
    pub fn with_compile(mut self, command: CommandSpec) -> Self {
        self.compile = command;
        self
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set the build timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a default configure flag
    #[must_use]
    pub fn with_build_flag(mut self, name: &str, value: &str) -> Self {
        self.build_flags.insert(name.to_string(), value.to_string());
        self
    }

    /// Add a process-wide environment variable
    #[must_use]
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }
}
