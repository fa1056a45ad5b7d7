//! Subprocess execution
//!
//! Two ways to run a command:
//! - [`execute_command`] for short queries whose whole output is wanted at once
//! - [`ProcessHandle`] + [`Supervisor`] for long-running steps whose output is
//!   streamed line by line, with a deadline, cancellation and early abort

mod cancel;
mod handle;
mod output;
mod reaper;
mod slot;
mod supervisor;

pub use cancel::{cancel_pair, CancelSignal, CancelTrigger};
pub use handle::ProcessHandle;
pub use output::{OutputLine, OutputStream};
pub use reaper::{StaleProcessReaper, SystemReaper};
pub use slot::ProcessSlot;
pub use supervisor::{LineSink, LineVerdict, Outcome, Supervisor};

use lunaris_errors::PlatformError;
use lunaris_events::{EventEmitter, ProcessDescriptor, ProcessEvent};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::core::PlatformContext;

/// Command builder shared by one-shot and streamed execution
#[derive(Debug, Clone)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
}

impl PlatformCommand {
    /// Create a new platform command
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<str>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Set an environment variable for the child
    pub fn env<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) -> &mut Self {
        self.env
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Run this command through `prefix`, e.g. `["nice", "-n", "19"]`.
    ///
    /// Environment and working directory are kept.
    #[must_use]
    pub fn wrapped(&self, prefix: &[&str]) -> Self {
        let Some((program, rest)) = prefix.split_first() else {
            return self.clone();
        };
        let mut args: Vec<String> = rest.iter().map(|s| (*s).to_string()).collect();
        args.push(self.program.clone());
        args.extend(self.args.iter().cloned());
        Self {
            program: (*program).to_string(),
            args,
            env: self.env.clone(),
            current_dir: self.current_dir.clone(),
        }
    }

    /// Get the program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the environment overrides
    pub fn get_env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Get the current directory
    pub fn get_current_dir(&self) -> Option<&PathBuf> {
        self.current_dir.as_ref()
    }

    /// Event-safe description of the command
    #[must_use]
    pub fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor {
            program: self.program.clone(),
            args: self.args.clone(),
            working_dir: self
                .current_dir
                .as_ref()
                .map(|dir| dir.display().to_string()),
        }
    }

    pub(crate) fn to_tokio(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

/// Output from one-shot command execution
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn spawn_error(command: &str, err: &std::io::Error) -> PlatformError {
    if err.kind() == std::io::ErrorKind::NotFound {
        PlatformError::CommandNotFound {
            command: command.to_string(),
        }
    } else {
        PlatformError::SpawnFailed {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}

/// Run a short command to completion and collect its output.
///
/// Stdin is closed. The child is killed if `timeout` elapses first.
///
/// # Errors
///
/// Returns `CommandNotFound` or `SpawnFailed` if the process cannot start,
/// and `Timeout` if it does not finish in time. A non-zero exit is not an
/// error; inspect [`CommandOutput::status`].
pub async fn execute_command(
    ctx: &PlatformContext,
    cmd: &PlatformCommand,
    timeout: Duration,
) -> Result<CommandOutput, PlatformError> {
    let start = Instant::now();
    let descriptor = cmd.descriptor();

    ctx.emit_process(ProcessEvent::Started {
        descriptor: descriptor.clone(),
        pid: None,
    });

    let mut command = cmd.to_tokio();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let result = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        Ok(Err(err)) => Err(spawn_error(cmd.program(), &err)),
        Err(_) => Err(PlatformError::Timeout {
            command: cmd.program().to_string(),
            timeout_seconds: timeout.as_secs(),
        }),
    };

    let duration_ms = duration_to_millis(start.elapsed());
    match &result {
        Ok(output) => ctx.emit_process(ProcessEvent::Completed {
            descriptor,
            exit_code: output.status.code(),
            duration_ms,
        }),
        Err(err) => ctx.emit_process(ProcessEvent::Failed {
            descriptor,
            error_message: err.to_string(),
            duration_ms,
        }),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_prepends_prefix_and_keeps_env() {
        let mut cmd = PlatformCommand::new("yay");
        cmd.args(["-S", "kitty"]).env("MAKEFLAGS", "-j1");

        let wrapped = cmd.wrapped(&["ionice", "-c", "3", "nice", "-n", "19"]);
        assert_eq!(wrapped.program(), "ionice");
        assert_eq!(
            wrapped.get_args(),
            ["-c", "3", "nice", "-n", "19", "yay", "-S", "kitty"]
        );
        assert_eq!(wrapped.get_env_vars(), cmd.get_env_vars());
    }

    #[test]
    fn empty_prefix_is_identity() {
        let cmd = PlatformCommand::new("git");
        assert_eq!(cmd.wrapped(&[]).program(), "git");
    }

    #[tokio::test]
    async fn one_shot_command_collects_output() {
        let ctx = PlatformContext::default();
        let mut cmd = PlatformCommand::new("sh");
        cmd.args(["-c", "echo hello; exit 3"]);

        let output = execute_command(&ctx, &cmd, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout_lossy().trim(), "hello");
    }

    #[tokio::test]
    async fn missing_program_is_command_not_found() {
        let ctx = PlatformContext::default();
        let cmd = PlatformCommand::new("lunaris-definitely-not-a-real-tool");
        let err = execute_command(&ctx, &cmd, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::CommandNotFound { .. }));
    }
}
