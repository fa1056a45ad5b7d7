use serde::{Deserialize, Serialize};

use crate::EventSource;
use lunaris_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code, when the error has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod general;
pub mod process;
pub mod session;

pub use general::*;
pub use process::*;
pub use session::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Installation session events (progress, prompts, outcome)
    Session(SessionEvent),

    /// Subprocess lifecycle events
    Process(ProcessEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Session(_) => EventSource::SESSION,
            Self::Process(_) => EventSource::PROCESS,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Session(SessionEvent::SessionFailed { .. })
            | Self::Process(ProcessEvent::Failed { .. }) => Level::ERROR,

            Self::Session(SessionEvent::LogLine { kind, .. }) => match kind {
                lunaris_types::LogKind::Error => Level::ERROR,
                lunaris_types::LogKind::Warning => Level::WARN,
                lunaris_types::LogKind::Debug => Level::DEBUG,
                _ => Level::INFO,
            },

            Self::General(GeneralEvent::Warning { .. })
            | Self::Session(SessionEvent::ConflictRaised { .. })
            | Self::Process(ProcessEvent::TimedOut { .. } | ProcessEvent::Terminated { .. }) => {
                Level::WARN
            }

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Session(SessionEvent::ProgressUpdate { .. })
            | Self::Process(ProcessEvent::Started { .. } | ProcessEvent::Completed { .. }) => {
                Level::DEBUG
            }

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "lunaris::events::general",
            Self::Session(_) => "lunaris::events::session",
            Self::Process(_) => "lunaris::events::process",
        }
    }
}
