//! The single active package-manager process

use lunaris_errors::PlatformError;
use lunaris_types::Credential;

use super::handle::ProcessHandle;
use super::supervisor::{LineSink, Outcome, Supervisor};
use super::PlatformCommand;
use crate::core::PlatformContext;

/// Holds at most one running [`ProcessHandle`].
///
/// Starting a process terminates whatever still occupies the slot, and the
/// new handle is stored before any input is written to it, so a
/// cancellation request always finds the process it has to stop.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    active: Option<ProcessHandle>,
}

impl ProcessSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn active_pid(&self) -> Option<u32> {
        self.active.as_ref().and_then(ProcessHandle::pid)
    }

    /// Spawn `cmd` into the slot, then hand it the credential (if any).
    ///
    /// Without a credential stdin is closed immediately so the child can
    /// never block on a prompt.
    ///
    /// # Errors
    ///
    /// Returns the spawn error, or the input error if the credential could
    /// not be written. The slot is empty again after a failed start.
    pub async fn start(
        &mut self,
        ctx: &PlatformContext,
        cmd: &PlatformCommand,
        line_capacity: usize,
        credential: Option<&Credential>,
    ) -> Result<(), PlatformError> {
        self.terminate().await;

        let handle = self
            .active
            .insert(ProcessHandle::spawn(ctx, cmd, line_capacity)?);

        let fed = match credential {
            Some(credential) => handle.feed_secret(credential).await,
            None => {
                handle.close_input();
                Ok(())
            }
        };
        if let Err(err) = fed {
            self.terminate().await;
            return Err(err);
        }
        Ok(())
    }

    /// Supervise the active process until it ends; the slot is empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns `InputClosed` if nothing is active, or the supervisor's error.
    pub async fn supervise(
        &mut self,
        supervisor: &Supervisor,
        sink: &mut dyn LineSink,
    ) -> Result<Outcome, PlatformError> {
        let Some(handle) = self.active.as_mut() else {
            return Err(PlatformError::InputClosed {
                command: "no active process".to_string(),
            });
        };
        let outcome = supervisor.await_completion(handle, sink).await;
        if let Some(mut handle) = self.active.take() {
            handle.terminate().await;
        }
        outcome
    }

    /// Terminate and reap the active process, if any.
    ///
    /// Returns whether a process was terminated.
    pub async fn terminate(&mut self) -> bool {
        match self.active.take() {
            Some(mut handle) => {
                handle.terminate().await;
                true
            }
            None => false,
        }
    }
}
