//! Package installation error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstallError {
    #[error("failed to install {package}: {message}")]
    PackageFailed {
        package: String,
        message: String,
        tail: Vec<String>,
    },

    #[error("package conflict while installing {package}: {message}")]
    Conflict { package: String, message: String },

    #[error("authentication failed during {step}")]
    AuthenticationFailed { step: String, tail: Vec<String> },

    #[error("package installation failed: {message}")]
    BatchFailed { message: String, tail: Vec<String> },

    #[error("{step} timed out after {timeout_seconds}s")]
    Timeout {
        step: String,
        timeout_seconds: u64,
        tail: Vec<String>,
    },

    #[error("package query failed: {message}")]
    QueryFailed { message: String },

    #[error("no packages specified")]
    NoPackagesSpecified,

    #[error("installation cancelled by user")]
    Cancelled,
}

impl InstallError {
    #[must_use]
    pub fn output_tail(&self) -> &[String] {
        match self {
            Self::PackageFailed { tail, .. }
            | Self::AuthenticationFailed { tail, .. }
            | Self::BatchFailed { tail, .. }
            | Self::Timeout { tail, .. } => tail,
            _ => &[],
        }
    }
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::AuthenticationFailed { .. } => {
                Some("Check the password and that your user may run sudo.")
            }
            Self::Timeout { .. } => Some("Increase process.step_timeout_secs and retry."),
            Self::Conflict { .. } => {
                Some("Remove the conflicting package manually or choose replace.")
            }
            Self::BatchFailed { .. } | Self::PackageFailed { .. } => {
                Some("Inspect the output above; `pacman -Syu` may be needed first.")
            }
            Self::NoPackagesSpecified => Some("Select at least one package or option."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::PackageFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::PackageFailed { .. } => "install.package_failed",
            Self::Conflict { .. } => "install.conflict",
            Self::AuthenticationFailed { .. } => "install.authentication_failed",
            Self::BatchFailed { .. } => "install.batch_failed",
            Self::Timeout { .. } => "install.timeout",
            Self::QueryFailed { .. } => "install.query_failed",
            Self::NoPackagesSpecified => "install.no_packages_specified",
            Self::Cancelled => "install.cancelled",
        };
        Some(code)
    }
}
