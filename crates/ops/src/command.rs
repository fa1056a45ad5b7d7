//! Decisions sent from the presentation layer to a running session

use lunaris_types::{ConflictChoice, Credential};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum SessionCommand {
    SubmitCredential(Credential),
    ResolveConflict(ConflictChoice),
    ConfirmDotfiles(bool),
    ConfirmBackup(bool),
    /// Acknowledged once every subprocess of the session is gone
    Cancel { ack: oneshot::Sender<()> },
}

impl SessionCommand {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitCredential(_) => "submit_credential",
            Self::ResolveConflict(_) => "resolve_conflict",
            Self::ConfirmDotfiles(_) => "confirm_dotfiles",
            Self::ConfirmBackup(_) => "confirm_backup",
            Self::Cancel { .. } => "cancel",
        }
    }
}
