//! Installation session phases

use serde::{Deserialize, Serialize};

/// The current stage of an installation session.
///
/// `Complete`, `Failed` and `Cancelled` are terminal: once reached no
/// further transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparation,
    HelperInstall,
    PackageInstall,
    ConflictPending,
    DotfilesConfirmation,
    BackupConfirmation,
    Backup,
    PostInstall,
    Complete,
    Failed,
    Cancelled,
}

impl Phase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Phases in which the session waits for a user decision.
    #[must_use]
    pub fn awaits_user(self) -> bool {
        matches!(
            self,
            Self::ConflictPending | Self::DotfilesConfirmation | Self::BackupConfirmation
        )
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::{
            Backup, BackupConfirmation, Cancelled, Complete, ConflictPending,
            DotfilesConfirmation, Failed, HelperInstall, PackageInstall, PostInstall,
            Preparation,
        };

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Cancelled | Failed) {
            return true;
        }
        matches!(
            (self, next),
            (Preparation, HelperInstall)
                | (HelperInstall, PackageInstall | ConflictPending)
                | (PackageInstall, ConflictPending | DotfilesConfirmation)
                | (ConflictPending, HelperInstall | PackageInstall | DotfilesConfirmation)
                | (DotfilesConfirmation, BackupConfirmation | Complete)
                | (BackupConfirmation, Backup | PostInstall)
                | (Backup, PostInstall)
                | (PostInstall, Complete)
        )
    }

    /// Short label used in progress events.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Preparation => "Preparing",
            Self::HelperInstall => "Installing AUR helper",
            Self::PackageInstall => "Installing packages",
            Self::ConflictPending => "Waiting for conflict resolution",
            Self::DotfilesConfirmation => "Waiting for dotfiles confirmation",
            Self::BackupConfirmation => "Waiting for backup confirmation",
            Self::Backup => "Backing up configuration",
            Self::PostInstall => "Installing configuration",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Preparation => "preparation",
            Self::HelperInstall => "helper_install",
            Self::PackageInstall => "package_install",
            Self::ConflictPending => "conflict_pending",
            Self::DotfilesConfirmation => "dotfiles_confirmation",
            Self::BackupConfirmation => "backup_confirmation",
            Self::Backup => "backup",
            Self::PostInstall => "post_install",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}
