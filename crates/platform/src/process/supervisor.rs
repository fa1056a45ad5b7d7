//! Deadline, cancellation and early-abort supervision of a running child

use lunaris_errors::PlatformError;
use lunaris_events::{EventEmitter, ProcessEvent};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use super::duration_to_millis;
use super::handle::ProcessHandle;
use super::output::OutputLine;
use super::CancelSignal;
use crate::core::PlatformContext;

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ExitedOk,
    /// Non-zero exit; `None` when the child was ended by a signal
    ExitedWithError(Option<i32>),
    /// The deadline elapsed and the process group was killed
    TimedOut,
    /// The line sink asked to stop; carries the sink's reason
    Aborted(String),
    /// The cancellation signal fired and the process group was killed
    Cancelled,
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::ExitedOk)
    }
}

/// Decision returned by a [`LineSink`] for each output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    Continue,
    Abort(String),
}

/// Receives every output line of a supervised process, in arrival order.
pub trait LineSink: Send {
    fn on_line(&mut self, line: &OutputLine) -> LineVerdict;
}

impl<F> LineSink for F
where
    F: FnMut(&OutputLine) -> LineVerdict + Send,
{
    fn on_line(&mut self, line: &OutputLine) -> LineVerdict {
        self(line)
    }
}

enum Wake {
    Cancelled,
    Deadline,
    Line(Option<OutputLine>),
    Exited(std::io::Result<std::process::ExitStatus>),
}

/// Races a child's exit against a deadline, a cancellation signal and the
/// sink's abort requests. Whatever wins, the child is reaped before
/// [`Supervisor::await_completion`] returns.
pub struct Supervisor {
    ctx: PlatformContext,
    timeout: Duration,
    drain_grace: Duration,
    cancel: CancelSignal,
}

impl Supervisor {
    #[must_use]
    pub fn new(ctx: PlatformContext, timeout: Duration, cancel: CancelSignal) -> Self {
        Self {
            ctx,
            timeout,
            drain_grace: Duration::from_secs(2),
            cancel,
        }
    }

    /// How long to keep reading output after the child exited.
    ///
    /// Grandchildren may hold the pipes open; after this grace the group
    /// is killed and remaining output dropped.
    #[must_use]
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drive `handle` to completion, feeding every line to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `WaitFailed` if the child's exit status cannot be collected.
    pub async fn await_completion(
        &self,
        handle: &mut ProcessHandle,
        sink: &mut dyn LineSink,
    ) -> Result<Outcome, PlatformError> {
        let deadline = handle.started + self.timeout;
        let mut cancel = self.cancel.clone();
        let mut lines_open = true;

        loop {
            let wake = tokio::select! {
                biased;
                () = cancel.cancelled() => Wake::Cancelled,
                () = sleep_until(deadline) => Wake::Deadline,
                line = handle.lines.recv(), if lines_open => Wake::Line(line),
                status = handle.child.wait() => Wake::Exited(status),
            };

            match wake {
                Wake::Cancelled => {
                    handle.terminate().await;
                    self.emit_terminated(handle, "cancelled");
                    return Ok(Outcome::Cancelled);
                }
                Wake::Deadline => {
                    handle.terminate().await;
                    tracing::warn!(
                        command = %handle.descriptor().command_line(),
                        timeout_secs = self.timeout.as_secs(),
                        "process timed out"
                    );
                    self.ctx.emit_process(ProcessEvent::TimedOut {
                        descriptor: handle.descriptor().clone(),
                        timeout_seconds: self.timeout.as_secs(),
                    });
                    return Ok(Outcome::TimedOut);
                }
                Wake::Line(Some(line)) => {
                    if let LineVerdict::Abort(reason) = sink.on_line(&line) {
                        handle.terminate().await;
                        self.emit_terminated(handle, &reason);
                        return Ok(Outcome::Aborted(reason));
                    }
                }
                Wake::Line(None) => lines_open = false,
                Wake::Exited(status) => {
                    let status = status.map_err(|err| PlatformError::WaitFailed {
                        command: handle.descriptor().program.clone(),
                        message: err.to_string(),
                    })?;
                    handle.mark_reaped();
                    return Ok(self.finish(handle, sink, status, lines_open).await);
                }
            }
        }
    }

    async fn finish(
        &self,
        handle: &mut ProcessHandle,
        sink: &mut dyn LineSink,
        status: std::process::ExitStatus,
        lines_open: bool,
    ) -> Outcome {
        let mut aborted = None;
        if lines_open {
            let drain_deadline = Instant::now() + self.drain_grace;
            loop {
                tokio::select! {
                    line = handle.lines.recv() => match line {
                        Some(line) => {
                            if let LineVerdict::Abort(reason) = sink.on_line(&line) {
                                aborted.get_or_insert(reason);
                            }
                        }
                        None => break,
                    },
                    () = sleep_until(drain_deadline) => {
                        tracing::debug!(
                            command = %handle.descriptor().command_line(),
                            "output still open after exit, killing leftover group members"
                        );
                        let _ = handle.kill_group();
                        break;
                    }
                }
            }
        }
        handle.stop_readers();

        self.ctx.emit_process(ProcessEvent::Completed {
            descriptor: handle.descriptor().clone(),
            exit_code: status.code(),
            duration_ms: duration_to_millis(handle.started.elapsed()),
        });

        if let Some(reason) = aborted {
            return Outcome::Aborted(reason);
        }
        if status.success() {
            Outcome::ExitedOk
        } else {
            Outcome::ExitedWithError(status.code())
        }
    }

    fn emit_terminated(&self, handle: &ProcessHandle, reason: &str) {
        tracing::info!(
            command = %handle.descriptor().command_line(),
            reason,
            "process group terminated"
        );
        self.ctx.emit_process(ProcessEvent::Terminated {
            descriptor: handle.descriptor().clone(),
            reason: reason.to_string(),
        });
    }
}
