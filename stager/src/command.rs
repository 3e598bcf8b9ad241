//! External command execution with captured output.
//!
//! Every download and extraction step goes through the [`CommandRunner`]
//! trait so the pipeline can be driven by a scripted runner in tests. The
//! production [`SystemCommandRunner`] waits for the child with an optional
//! timeout and kills it when the timeout elapses.

use camino::Utf8PathBuf;
use std::fmt;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Per-invocation execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Working directory for the child process.
    pub cwd: Option<Utf8PathBuf>,
    /// Kill the child and fail once this much time has elapsed.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    /// Options that run the command inside `cwd`.
    #[must_use]
    pub fn in_dir(cwd: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            timeout: None,
        }
    }

    /// Return these options with the given timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured stdout with surrounding whitespace trimmed.
    pub stdout: String,
    /// Captured stderr with surrounding whitespace trimmed.
    ///
    /// Many tools write status messages here, so a non-empty value is
    /// informational rather than a failure signal.
    pub stderr: String,
}

impl CommandOutput {
    /// Build an output from untrimmed stdout and stderr.
    #[must_use]
    pub fn new(stdout: &str, stderr: &str) -> Self {
        Self {
            stdout: stdout.trim().to_owned(),
            stderr: stderr.trim().to_owned(),
        }
    }
}

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// The process could not be started or waited on.
    Spawn(String),
    /// The process exited unsuccessfully. `None` when killed by a signal.
    ExitStatus(Option<i32>),
    /// The process exceeded its timeout and was killed.
    TimedOut(Duration),
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(reason) => write!(f, "could not run: {reason}"),
            Self::ExitStatus(Some(code)) => write!(f, "exited with status {code}"),
            Self::ExitStatus(None) => f.write_str("terminated by signal"),
            Self::TimedOut(limit) => write!(f, "timed out after {} seconds", limit.as_secs()),
        }
    }
}

/// A command that failed, with whatever output it produced before failing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command `{command}` {failure}")]
pub struct CommandExecutionError {
    /// The full command line as displayed to the user.
    pub command: String,
    /// What went wrong.
    pub failure: CommandFailure,
    /// Captured stdout, untrimmed.
    pub stdout: String,
    /// Captured stderr, untrimmed.
    pub stderr: String,
}

impl CommandExecutionError {
    /// A failure with no captured output.
    #[must_use]
    pub fn without_output(command: impl Into<String>, failure: CommandFailure) -> Self {
        Self {
            command: command.into(),
            failure,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// The most useful one-line explanation: trimmed stderr when present,
    /// otherwise the failure description.
    #[must_use]
    pub fn reason(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.to_string()
        } else {
            format!("{self}: {stderr}")
        }
    }
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `program` with `args` and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns [`CommandExecutionError`] when the process cannot be started,
    /// exits unsuccessfully, or exceeds its timeout. The error carries any
    /// stdout and stderr captured up to that point.
    fn run(
        &self,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, CommandExecutionError>;
}

/// Render a program and its arguments as a single display string.
///
/// # Examples
///
/// ```
/// use asset_stager::command::display_command;
///
/// let args = vec!["pack".to_owned(), "pkg@^1.0.0".to_owned()];
/// assert_eq!(display_command("npm", &args), "npm pack pkg@^1.0.0");
/// ```
#[must_use]
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, CommandExecutionError> {
        let command_line = display_command(program, args);
        log::debug!("running `{command_line}`");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir.as_std_path());
        }

        let mut child = cmd.spawn().map_err(|e| {
            CommandExecutionError::without_output(&command_line, CommandFailure::Spawn(e.to_string()))
        })?;

        // Drain both pipes while waiting so a chatty child cannot block on a
        // full pipe buffer.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let waited = match options.timeout {
            Some(limit) => child.wait_timeout(limit).map(|status| status.ok_or(limit)),
            None => child.wait().map(Ok),
        };

        let status = match waited {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(limit)) => {
                if let Err(e) = child.kill() {
                    log::warn!("failed to kill timed out `{command_line}`: {e}");
                }
                if let Err(e) = child.wait() {
                    log::warn!("failed to reap timed out `{command_line}`: {e}");
                }
                Err(CommandFailure::TimedOut(limit))
            }
            Err(e) => Err(CommandFailure::Spawn(e.to_string())),
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        match status.and_then(check_status) {
            Ok(()) => Ok(CommandOutput::new(&stdout, &stderr)),
            Err(failure) => Err(CommandExecutionError {
                command: command_line,
                failure,
                stdout,
                stderr,
            }),
        }
    }
}

fn check_status(status: ExitStatus) -> Result<(), CommandFailure> {
    if status.success() {
        Ok(())
    } else {
        Err(CommandFailure::ExitStatus(status.code()))
    }
}

fn spawn_reader<R>(mut pipe: R) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::debug!("error reading child output: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
