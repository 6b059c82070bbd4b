//! External process execution
//!
//! Runs configure/compile/git commands with an explicit working directory and
//! environment, capturing stdout and stderr in full. An optional timeout
//! kills the child when it expires.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How often a child is polled while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output is still collected after a timed-out child was killed
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Process execution errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be started
    #[error("Failed to launch '{program}': {error}")]
    Launch { program: String, error: String },

    /// The program ran past its deadline and was killed
    #[error("'{program}' timed out after {}s", timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        output: CapturedOutput,
    },

    /// Waiting on or killing the child failed
    #[error("Failed to wait for '{program}': {error}")]
    Wait { program: String, error: String },
}

/// Everything a finished process wrote, plus how it exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Exit code (None when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CapturedOutput {
    /// Whether the process exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A single external command to run
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Complete environment; `None` inherits the parent's environment
    pub env: Option<BTreeMap<String, String>>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Create an invocation inheriting the current environment
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: None,
            timeout: None,
        }
    }

    /// Append arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the environment entirely
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Set a timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-style rendering used in logs and build transcripts
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run an invocation to completion
///
/// A non-zero exit is not an error here: it is reported through
/// [`CapturedOutput::success`] so callers can keep the transcript.
///
/// On unix the child leads its own process group, and a timeout kills the
/// whole group so processes it started (compiler jobs, shell children) die
/// with it.
pub fn run(invocation: &Invocation) -> Result<CapturedOutput, ProcessError> {
    tracing::debug!(
        "Running `{}` in {}",
        invocation.command_line(),
        invocation.cwd.display()
    );

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(env) = &invocation.env {
        cmd.env_clear().envs(env);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|e| ProcessError::Launch {
        program: invocation.program.clone(),
        error: e.to_string(),
    })?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let waited = match invocation.timeout {
        Some(timeout) => wait_with_deadline(&mut child, timeout),
        None => child.wait().map(Some),
    };

    let status = waited.map_err(|e| ProcessError::Wait {
        program: invocation.program.clone(),
        error: e.to_string(),
    })?;

    // After a kill, anything that escaped the process group may still hold
    // the pipes open; stop waiting for it.
    let drain = status.is_none().then_some(DRAIN_TIMEOUT);
    let output = CapturedOutput {
        exit_code: status.and_then(|s| s.code()),
        stdout: collect_reader(stdout, drain),
        stderr: collect_reader(stderr, drain),
    };

    match (status, invocation.timeout) {
        (None, Some(timeout)) => Err(ProcessError::TimedOut {
            program: invocation.program.clone(),
            timeout,
            output,
        }),
        _ => Ok(output),
    }
}

/// Poll the child until it exits or the deadline passes.
///
/// Returns `Ok(None)` when the child had to be killed.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            kill_process_group(child)?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGKILL the child's process group; the child is its leader
#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // Group already gone
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<Receiver<String>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error just truncates the transcript.
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// Wait for a reader's text; with a limit, give up and leave the thread behind
fn collect_reader(reader: Option<Receiver<String>>, limit: Option<Duration>) -> String {
    let Some(rx) = reader else {
        return String::new();
    };
    match limit {
        Some(limit) => rx.recv_timeout(limit).unwrap_or_default(),
        None => rx.recv().unwrap_or_default(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str, cwd: &std::path::Path) -> Invocation {
        Invocation::new("sh", cwd).with_args(["-c", script])
    }

    #[test]
    fn test_captures_stdout_and_stderr() {
        let temp = TempDir::new().unwrap();
        let output = run(&sh("echo out; echo err >&2", temp.path())).unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let output = run(&sh("echo broken >&2; exit 3", temp.path())).unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "broken");
        assert_eq!(output.to_string(), "exit code 3");
    }

    #[test]
    fn test_runs_in_working_directory() {
        let temp = TempDir::new().unwrap();
        run(&sh("touch marker", temp.path())).unwrap();
        assert!(temp.path().join("marker").exists());
    }

    #[test]
    fn test_explicit_environment_replaces_parent() {
        let temp = TempDir::new().unwrap();
        let mut env = BTreeMap::new();
        env.insert("ONLY_VAR".to_string(), "value".to_string());
        env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());

        let output = run(&Invocation::new("/bin/sh", temp.path())
            .with_args(["-c", "echo \"$ONLY_VAR:${HOME:-unset}\""])
            .with_env(env))
        .unwrap();

        assert_eq!(output.stdout.trim(), "value:unset");
    }

    #[test]
    fn test_launch_failure() {
        let temp = TempDir::new().unwrap();
        let result = run(&Invocation::new("definitely-not-a-real-program-xyz", temp.path()));
        assert!(matches!(result, Err(ProcessError::Launch { .. })));
    }

    #[test]
    fn test_timeout_kills_process() {
        let temp = TempDir::new().unwrap();
        let started = Instant::now();
        let result = run(&sh("echo started; exec sleep 10", temp.path())
            .with_timeout(Some(Duration::from_millis(300))));

        match result {
            Err(ProcessError::TimedOut { output, timeout, .. }) => {
                assert_eq!(timeout, Duration::from_millis(300));
                assert_eq!(output.stdout.trim(), "started");
                assert!(!output.success());
            }
            other => panic!("Expected TimedOut, got: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Live and not a zombie waiting for its new parent to reap it
    fn is_running(pid: &str) -> bool {
        let proc_dir = std::path::Path::new("/proc");
        if proc_dir.is_dir() {
            return match std::fs::read_to_string(proc_dir.join(pid).join("stat")) {
                Ok(stat) => stat
                    .rsplit(')')
                    .next()
                    .and_then(|rest| rest.split_whitespace().next())
                    .is_some_and(|state| state != "Z" && state != "X"),
                Err(_) => false,
            };
        }
        Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    #[test]
    fn test_timeout_kills_processes_started_by_the_child() {
        let temp = TempDir::new().unwrap();
        let started = Instant::now();
        let result = run(&sh(
            "sleep 30 & echo $! > sleeper.pid; echo started; wait",
            temp.path(),
        )
        .with_timeout(Some(Duration::from_millis(300))));

        let elapsed = started.elapsed();
        assert!(
            matches!(result, Err(ProcessError::TimedOut { .. })),
            "Expected TimedOut, got: {result:?}"
        );
        assert!(elapsed < Duration::from_secs(3), "run took {elapsed:?}");

        let pid = std::fs::read_to_string(temp.path().join("sleeper.pid")).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(3);
        while is_running(pid) {
            assert!(Instant::now() < deadline, "sleep {pid} survived the timeout");
            thread::sleep(POLL_INTERVAL);
        }
    }

    #[test]
    fn test_timeout_does_not_wait_for_shell_children() {
        let temp = TempDir::new().unwrap();
        let started = Instant::now();
        let result = run(&sh("sleep 6; echo done", temp.path())
            .with_timeout(Some(Duration::from_millis(300))));

        assert!(matches!(result, Err(ProcessError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_command_line_rendering() {
        let inv = Invocation::new("cmake", "/tmp").with_args(["-DA=1", "/src"]);
        assert_eq!(inv.command_line(), "cmake -DA=1 /src");
    }
}
