//! Process and filesystem operation errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Errors that can occur while driving subprocesses or touching the filesystem
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlatformError {
    #[error("failed to start {command}: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("failed to write input to {command}: {message}")]
    InputWriteFailed { command: String, message: String },

    #[error("input to {command} already closed")]
    InputClosed { command: String },

    #[error("failed to wait for {command}: {message}")]
    WaitFailed { command: String, message: String },

    #[error("failed to signal process group {pgid}: {message}")]
    SignalFailed { pgid: i32, message: String },

    #[error("{command} timed out after {timeout_seconds}s")]
    Timeout {
        command: String,
        timeout_seconds: u64,
    },

    #[error("filesystem operation failed: {operation} on {path} - {message}")]
    FilesystemOperationFailed {
        operation: String,
        path: String,
        message: String,
    },

    #[error("permission denied: {operation} - {message}")]
    PermissionDenied { operation: String, message: String },
}

impl UserFacingError for PlatformError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandNotFound { .. } => {
                Some("Install the missing tool (base-devel, git) and retry.")
            }
            Self::Timeout { .. } => {
                Some("Increase process.step_timeout_secs or check the network, then retry.")
            }
            Self::PermissionDenied { .. } => Some("Check ownership of the affected path."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::SpawnFailed { .. } => "platform.spawn_failed",
            Self::CommandNotFound { .. } => "platform.command_not_found",
            Self::InputWriteFailed { .. } => "platform.input_write_failed",
            Self::InputClosed { .. } => "platform.input_closed",
            Self::WaitFailed { .. } => "platform.wait_failed",
            Self::SignalFailed { .. } => "platform.signal_failed",
            Self::Timeout { .. } => "platform.timeout",
            Self::FilesystemOperationFailed { .. } => "platform.filesystem_failed",
            Self::PermissionDenied { .. } => "platform.permission_denied",
        };
        Some(code)
    }
}
