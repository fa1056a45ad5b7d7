//! AUR helper bootstrap errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HelperError {
    #[error("unsupported AUR helper: {helper}")]
    Unsupported { helper: String },

    #[error("failed to clone {helper} recipe: {message}")]
    CloneFailed {
        helper: String,
        message: String,
        tail: Vec<String>,
    },

    #[error("failed to build {helper}: {message}")]
    BuildFailed {
        helper: String,
        message: String,
        tail: Vec<String>,
    },

    #[error("build of {helper} produced no installable package")]
    NoArtifacts { helper: String },

    #[error("failed to install built {helper} package: {message}")]
    InstallFailed {
        helper: String,
        message: String,
        tail: Vec<String>,
    },

    #[error("{helper} is still not on PATH after installation")]
    MissingAfterInstall { helper: String },
}

impl HelperError {
    #[must_use]
    pub fn output_tail(&self) -> &[String] {
        match self {
            Self::CloneFailed { tail, .. }
            | Self::BuildFailed { tail, .. }
            | Self::InstallFailed { tail, .. } => tail,
            _ => &[],
        }
    }
}

impl UserFacingError for HelperError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Unsupported { .. } => Some("Choose one of the supported helpers: yay, paru."),
            Self::CloneFailed { .. } => Some("Check network access to aur.archlinux.org."),
            Self::BuildFailed { .. } | Self::NoArtifacts { .. } => {
                Some("Make sure base-devel and the helper's build dependencies are installed.")
            }
            Self::InstallFailed { .. } | Self::MissingAfterInstall { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::CloneFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Unsupported { .. } => "helper.unsupported",
            Self::CloneFailed { .. } => "helper.clone_failed",
            Self::BuildFailed { .. } => "helper.build_failed",
            Self::NoArtifacts { .. } => "helper.no_artifacts",
            Self::InstallFailed { .. } => "helper.install_failed",
            Self::MissingAfterInstall { .. } => "helper.missing_after_install",
        };
        Some(code)
    }
}
