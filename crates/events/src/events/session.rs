//! Installation session events
//!
//! These are the only signals the presentation layer needs to render a
//! session: progress, log lines, the three suspension points and the
//! terminal outcome.

use lunaris_types::{LogKind, Phase};
use serde::{Deserialize, Serialize};

use super::FailureContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },

    ProgressUpdate {
        progress: usize,
        total: usize,
        current_step: String,
        phase: Phase,
    },

    /// A line appended to the message log
    LogLine {
        kind: LogKind,
        source: String,
        text: String,
    },

    ConflictRaised {
        package: String,
        hint: Option<String>,
        raw_message: String,
    },

    /// The current step needs the privilege-escalation secret.
    CredentialRequested {
        step: String,
        /// `true` when a previously submitted secret was rejected
        rejected: bool,
    },

    DotfilesConfirmationRequested,

    BackupConfirmationRequested {
        backup_dir: String,
    },

    SessionComplete {
        progress: usize,
        total: usize,
    },

    SessionFailed {
        failure: FailureContext,
        /// Last lines of the message log at the time of failure
        tail: Vec<String>,
    },

    SessionCancelled,
}
