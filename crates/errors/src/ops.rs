//! Session orchestration error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpsError {
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("session already finished")]
    SessionFinished,

    #[error("session command channel closed")]
    ChannelClosed,

    #[error("operation failed: {message}")]
    OperationFailed { message: String },
}

impl UserFacingError for OpsError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidTransition { .. } => "ops.invalid_transition",
            Self::SessionFinished => "ops.session_finished",
            Self::ChannelClosed => "ops.channel_closed",
            Self::OperationFailed { .. } => "ops.operation_failed",
        };
        Some(code)
    }
}
