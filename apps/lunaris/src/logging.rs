//! Structured logging integration for events
//!
//! Every event the session emits is mirrored into `tracing` with structured
//! fields, so a `--debug` log file holds the whole session even though the
//! terminal only shows the latest lines.

use lunaris_events::{AppEvent, EventMessage, GeneralEvent, ProcessEvent, SessionEvent};
use lunaris_types::LogKind;
use tracing::{debug, error, info, warn};

/// Log an `AppEvent` at its own level with structured fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    match &message.event {
        AppEvent::Session(event) => match event {
            SessionEvent::PhaseChanged { from, to } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    from = from.label(),
                    to = to.label(),
                    "Phase changed"
                );
            }
            SessionEvent::ProgressUpdate {
                progress,
                total,
                current_step,
                phase,
            } => {
                debug!(
                    correlation = ?meta.correlation_id,
                    progress,
                    total,
                    step = %current_step,
                    phase = phase.label(),
                    "Progress"
                );
            }
            SessionEvent::LogLine { kind, source, text } => match kind {
                LogKind::Error => error!(correlation = ?meta.correlation_id, source = %source, "{text}"),
                LogKind::Warning => warn!(correlation = ?meta.correlation_id, source = %source, "{text}"),
                LogKind::Debug => debug!(correlation = ?meta.correlation_id, source = %source, "{text}"),
                LogKind::Info | LogKind::Success => {
                    info!(correlation = ?meta.correlation_id, source = %source, kind = %kind, "{text}");
                }
            },
            SessionEvent::ConflictRaised {
                package,
                hint,
                raw_message,
            } => {
                warn!(
                    correlation = ?meta.correlation_id,
                    package = %package,
                    hint = ?hint,
                    raw = %raw_message,
                    "Package conflict"
                );
            }
            SessionEvent::CredentialRequested { step, rejected } => {
                info!(
                    correlation = ?meta.correlation_id,
                    step = %step,
                    rejected,
                    "Credential requested"
                );
            }
            SessionEvent::DotfilesConfirmationRequested => {
                info!(correlation = ?meta.correlation_id, "Dotfiles confirmation requested");
            }
            SessionEvent::BackupConfirmationRequested { backup_dir } => {
                info!(
                    correlation = ?meta.correlation_id,
                    backup_dir = %backup_dir,
                    "Backup confirmation requested"
                );
            }
            SessionEvent::SessionComplete { progress, total } => {
                info!(
                    correlation = ?meta.correlation_id,
                    progress,
                    total,
                    "Session complete"
                );
            }
            SessionEvent::SessionFailed { failure, tail } => {
                error!(
                    correlation = ?meta.correlation_id,
                    code = ?failure.code,
                    retryable = failure.retryable,
                    tail = ?tail,
                    "Session failed: {}",
                    failure.message
                );
            }
            SessionEvent::SessionCancelled => {
                warn!(correlation = ?meta.correlation_id, "Session cancelled");
            }
        },

        AppEvent::Process(event) => match event {
            ProcessEvent::Started { descriptor, pid } => {
                debug!(
                    correlation = ?meta.correlation_id,
                    command = %descriptor.command_line(),
                    cwd = ?descriptor.working_dir,
                    pid = ?pid,
                    "Process started"
                );
            }
            ProcessEvent::Completed {
                descriptor,
                exit_code,
                duration_ms,
            } => {
                debug!(
                    correlation = ?meta.correlation_id,
                    command = %descriptor.command_line(),
                    exit_code = ?exit_code,
                    duration_ms,
                    "Process completed"
                );
            }
            ProcessEvent::Failed {
                descriptor,
                error_message,
                duration_ms,
            } => {
                error!(
                    correlation = ?meta.correlation_id,
                    command = %descriptor.command_line(),
                    error = %error_message,
                    duration_ms,
                    "Process failed"
                );
            }
            ProcessEvent::TimedOut {
                descriptor,
                timeout_seconds,
            } => {
                warn!(
                    correlation = ?meta.correlation_id,
                    command = %descriptor.command_line(),
                    timeout_seconds,
                    "Process timed out"
                );
            }
            ProcessEvent::Terminated { descriptor, reason } => {
                warn!(
                    correlation = ?meta.correlation_id,
                    command = %descriptor.command_line(),
                    reason = %reason,
                    "Process terminated"
                );
            }
            ProcessEvent::StaleProcessesTerminated { name, count } => {
                info!(
                    correlation = ?meta.correlation_id,
                    name = %name,
                    count,
                    "Stale processes terminated"
                );
            }
        },

        AppEvent::General(event) => match event {
            GeneralEvent::Warning { message, context } => {
                warn!(source = meta.source.as_str(), context = ?context, "{message}");
            }
            GeneralEvent::Error { message } => {
                error!(source = meta.source.as_str(), correlation = ?meta.correlation_id, "{message}");
            }
            GeneralEvent::DebugLog { message } => {
                debug!(source = meta.source.as_str(), correlation = ?meta.correlation_id, "{message}");
            }
        },
    }
}
