//! Presentation-side handle to a running session

use lunaris_errors::{Error, OpsError};
use lunaris_platform::CancelTrigger;
use lunaris_types::{ConflictChoice, Credential};
use tokio::sync::{mpsc, oneshot};

use crate::command::SessionCommand;

/// Cheap to clone; every clone talks to the same session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancelTrigger,
    session_id: String,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<SessionCommand>,
        cancel: CancelTrigger,
        session_id: String,
    ) -> Self {
        Self {
            commands,
            cancel,
            session_id,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, command: SessionCommand) -> Result<(), Error> {
        self.commands
            .send(command)
            .map_err(|_| OpsError::SessionFinished.into())
    }

    /// # Errors
    ///
    /// Returns `SessionFinished` if the session has already ended.
    pub fn submit_credential(&self, credential: Credential) -> Result<(), Error> {
        self.send(SessionCommand::SubmitCredential(credential))
    }

    /// # Errors
    ///
    /// Returns `SessionFinished` if the session has already ended.
    pub fn resolve_conflict(&self, choice: ConflictChoice) -> Result<(), Error> {
        self.send(SessionCommand::ResolveConflict(choice))
    }

    /// # Errors
    ///
    /// Returns `SessionFinished` if the session has already ended.
    pub fn confirm_dotfiles(&self, install: bool) -> Result<(), Error> {
        self.send(SessionCommand::ConfirmDotfiles(install))
    }

    /// # Errors
    ///
    /// Returns `SessionFinished` if the session has already ended.
    pub fn confirm_backup(&self, backup: bool) -> Result<(), Error> {
        self.send(SessionCommand::ConfirmBackup(backup))
    }

    /// Cancel the session and wait until it has stopped its subprocesses.
    ///
    /// Returns immediately if the session has already ended.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        let (ack, done) = oneshot::channel();
        if self.commands.send(SessionCommand::Cancel { ack }).is_ok() {
            // a dropped sender means the session ended on its own
            let _ = done.await;
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }
}
