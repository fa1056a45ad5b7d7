//! Configuration repository and backup errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DotfilesError {
    #[error("failed to clone configuration repository {repository}: {message}")]
    CloneFailed {
        repository: String,
        message: String,
        tail: Vec<String>,
    },

    #[error("repository cloned but appears to be empty: {path}")]
    EmptyCheckout { path: String },

    #[error("failed to copy {from} to {to}: {message}")]
    CopyFailed {
        from: String,
        to: String,
        message: String,
    },

    #[error("backup of {path} failed: {message}")]
    BackupFailed { path: String, message: String },

    #[error("failed to prepare {path}: {message}")]
    PrepareFailed { path: String, message: String },
}

impl DotfilesError {
    #[must_use]
    pub fn output_tail(&self) -> &[String] {
        match self {
            Self::CloneFailed { tail, .. } => tail,
            _ => &[],
        }
    }
}

impl UserFacingError for DotfilesError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CloneFailed { .. } => Some("Check network access and the repository URL."),
            Self::EmptyCheckout { .. } => Some("Verify dotfiles.repository points at a populated repository."),
            Self::CopyFailed { .. } | Self::BackupFailed { .. } | Self::PrepareFailed { .. } => {
                Some("Check free disk space and permissions in your home directory.")
            }
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::CloneFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::CloneFailed { .. } => "dotfiles.clone_failed",
            Self::EmptyCheckout { .. } => "dotfiles.empty_checkout",
            Self::CopyFailed { .. } => "dotfiles.copy_failed",
            Self::BackupFailed { .. } => "dotfiles.backup_failed",
            Self::PrepareFailed { .. } => "dotfiles.prepare_failed",
        };
        Some(code)
    }
}
