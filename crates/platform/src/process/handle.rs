//! A running child process with streamed output

use lunaris_errors::PlatformError;
use lunaris_events::{EventEmitter, ProcessDescriptor, ProcessEvent};
use lunaris_types::Credential;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::output::{spawn_reader, OutputLine, OutputStream};
use super::{spawn_error, PlatformCommand};
use crate::core::PlatformContext;

/// A spawned child in its own process group.
///
/// Stdout and stderr are read concurrently into one bounded channel, so
/// neither pipe can fill up while the other is being drained. Dropping an
/// unreaped handle kills the whole group.
#[derive(Debug)]
pub struct ProcessHandle {
    pub(crate) child: Child,
    pub(crate) lines: mpsc::Receiver<OutputLine>,
    pub(crate) started: Instant,
    pub(crate) reaped: bool,
    stdin: Option<ChildStdin>,
    readers: Vec<JoinHandle<()>>,
    pgid: Option<i32>,
    descriptor: ProcessDescriptor,
}

impl ProcessHandle {
    /// Spawn `cmd` with piped stdio in a new process group.
    ///
    /// # Errors
    ///
    /// Returns `CommandNotFound` if the program does not exist and
    /// `SpawnFailed` for any other start-up failure.
    pub fn spawn(
        ctx: &PlatformContext,
        cmd: &PlatformCommand,
        line_capacity: usize,
    ) -> Result<Self, PlatformError> {
        let descriptor = cmd.descriptor();
        let mut command = cmd.to_tokio();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| {
            let error = spawn_error(cmd.program(), &err);
            ctx.emit_process(ProcessEvent::Failed {
                descriptor: descriptor.clone(),
                error_message: error.to_string(),
                duration_ms: 0,
            });
            error
        })?;

        let pid = child.id();
        let (tx, lines) = mpsc::channel(line_capacity.max(1));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputStream::Stderr, tx));
        }
        let stdin = child.stdin.take();

        tracing::debug!(command = %descriptor.command_line(), pid, "process started");
        ctx.emit_process(ProcessEvent::Started {
            descriptor: descriptor.clone(),
            pid,
        });

        Ok(Self {
            child,
            lines,
            started: Instant::now(),
            reaped: false,
            stdin,
            readers,
            // process_group(0) makes the child the group leader
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
            descriptor,
        })
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    #[must_use]
    pub fn descriptor(&self) -> &ProcessDescriptor {
        &self.descriptor
    }

    /// Write the secret followed by a newline, then close stdin.
    ///
    /// The secret is consumed by exactly one process and never echoed.
    ///
    /// # Errors
    ///
    /// Returns `InputClosed` if stdin was already closed and
    /// `InputWriteFailed` if the child stopped reading.
    pub async fn feed_secret(&mut self, credential: &Credential) -> Result<(), PlatformError> {
        let mut stdin = self.stdin.take().ok_or_else(|| PlatformError::InputClosed {
            command: self.descriptor.program.clone(),
        })?;

        let mut payload = Vec::with_capacity(credential.expose().len() + 1);
        payload.extend_from_slice(credential.expose().as_bytes());
        payload.push(b'\n');

        let result = async {
            stdin.write_all(&payload).await?;
            stdin.flush().await?;
            stdin.shutdown().await
        }
        .await;
        payload.fill(0);

        match result {
            Ok(()) => Ok(()),
            // the child exited before reading; its output tells the caller why
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(command = %self.descriptor.program, "stdin closed before the secret was read");
                Ok(())
            }
            Err(err) => Err(PlatformError::InputWriteFailed {
                command: self.descriptor.program.clone(),
                message: err.to_string(),
            }),
        }
    }

    /// Close stdin without writing anything.
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// SIGKILL the whole process group.
    ///
    /// A group that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns `SignalFailed` if the signal could not be delivered.
    pub fn kill_group(&mut self) -> Result<(), PlatformError> {
        if let Some(pgid) = self.pgid {
            signal_group(pgid)?;
        } else {
            let _ = self.child.start_kill();
        }
        Ok(())
    }

    /// Kill the group, reap the child and stop the readers.
    pub async fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(err) = self.kill_group() {
            tracing::warn!(error = %err, "failed to signal process group");
            let _ = self.child.start_kill();
        }
        if let Err(err) = self.child.wait().await {
            tracing::warn!(error = %err, "failed to reap terminated process");
        }
        self.mark_reaped();
        self.stop_readers();
    }

    pub(crate) fn mark_reaped(&mut self) {
        self.reaped = true;
        self.stdin = None;
    }

    pub(crate) fn stop_readers(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.reaped {
            if let Some(pgid) = self.pgid {
                let _ = signal_group(pgid);
            }
        }
        self.stop_readers();
    }
}

#[allow(unsafe_code)]
fn signal_group(pgid: i32) -> Result<(), PlatformError> {
    // SAFETY: killpg takes plain integers and has no memory-safety preconditions.
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(PlatformError::SignalFailed {
        pgid,
        message: err.to_string(),
    })
}
